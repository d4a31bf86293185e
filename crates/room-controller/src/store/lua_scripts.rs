//! Lua scripts for atomic Redis session-store operations.
//!
//! Every mutation of a shared record runs as one script so two peers joining
//! or leaving the same room concurrently can never interleave half-applied
//! updates (lost-update prevention).
//!
//! # Key layout
//!
//! - `rc:room:{id}` - room metadata (HASH: `controller_id`, `created_at`)
//! - `rc:room:{id}:members` - member peer ids (SET)
//! - `rc:peer:{id}` - peer metadata (HASH: `room_id`)
//! - `rc:peer:{id}:{slot}` - one resource-id list per slot (SET), where slot
//!   is one of `producer_transport_ids`, `consumer_transport_ids`,
//!   `producer_ids`, `consumer_ids`

/// Create a room unless it exists.
///
/// Arguments:
/// - KEYS[1]: Room hash key
/// - ARGV[1]: Controller id the room is pinned to
/// - ARGV[2]: Creation timestamp
///
/// Returns:
/// - 1: Created
/// - 0: A record already exists (caller re-reads it to check pinning)
pub const CREATE_ROOM: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'controller_id', ARGV[1], 'created_at', ARGV[2])
return 1
"#;

/// Add a peer to a room's member set and create its empty peer record.
///
/// Arguments:
/// - KEYS[1]: Room hash key
/// - KEYS[2]: Room member set key
/// - KEYS[3]: Peer hash key
/// - ARGV[1]: Peer id
/// - ARGV[2]: Peer limit (0 = unlimited)
/// - ARGV[3]: Room id
///
/// Returns:
/// - 1: Added
/// - 0: Already a member
/// - -1: Room record missing
/// - -2: Room full
pub const ADD_MEMBER: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1 then
    return 0
end
local max = tonumber(ARGV[2])
if max ~= nil and max > 0 and redis.call('SCARD', KEYS[2]) >= max then
    return -2
end
redis.call('SADD', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], 'room_id', ARGV[3])
return 1
"#;

/// Append a resource id to one of a peer's id sets, but only while the peer
/// record still exists. Keeps a disconnect racing a resource creation from
/// leaving an orphaned id behind.
///
/// Arguments:
/// - KEYS[1]: Peer hash key
/// - KEYS[2]: Slot set key
/// - ARGV[1]: Resource id
///
/// Returns:
/// - 1: Appended
/// - 0: Peer record missing
pub const APPEND_RESOURCE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('SADD', KEYS[2], ARGV[1])
return 1
"#;

/// Remove a resource id from one of a peer's id sets.
///
/// Arguments:
/// - KEYS[1]: Peer hash key
/// - KEYS[2]: Slot set key
/// - ARGV[1]: Resource id
///
/// Returns:
/// - 1: Removed (or id was not present)
/// - 0: Peer record missing
pub const REMOVE_RESOURCE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('SREM', KEYS[2], ARGV[1])
return 1
"#;

/// Delete a peer record and pull it from its room, deleting the room record
/// in the same step when the membership reaches zero. The single script is
/// what makes "membership zero implies room record gone" hold at every
/// observable instant.
///
/// Arguments:
/// - KEYS[1]: Peer hash key
/// - KEYS[2..5]: The peer's four slot set keys
/// - KEYS[6]: Room hash key
/// - KEYS[7]: Room member set key
/// - ARGV[1]: Peer id
///
/// Returns:
/// - 2: Removed; the room emptied and its record was deleted
/// - 1: Removed; other members remain
/// - 0: Peer record missing (duplicate removal)
pub const REMOVE_PEER: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('DEL', KEYS[1], KEYS[2], KEYS[3], KEYS[4], KEYS[5])
redis.call('SREM', KEYS[7], ARGV[1])
if redis.call('SCARD', KEYS[7]) == 0 then
    redis.call('DEL', KEYS[6], KEYS[7])
    return 2
end
return 1
"#;
