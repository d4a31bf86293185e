//! In-memory media engine double.
//!
//! Allocates deterministic handle ids, tracks open/connected/paused state,
//! records close order, and supports failure injection so coordinator and
//! gateway behavior can be tested without a real engine worker.
//!
//! Produce and consume require a connected transport, matching real engine
//! behavior, so tests exercise the full negotiation sequence.

use async_trait::async_trait;
use parking_lot::Mutex;
use room_controller::engine::{
    CodecCapability, ConsumerDescriptor, ConsumerHandle, DtlsParameters, IceCandidate,
    IceParameters, MediaEngine, MediaKind, NetworkConfig, ProducerHandle, RouterHandle,
    RtpCapabilities, RtpParameters, TransportDescriptor, TransportDirection, TransportHandle,
};
use room_controller::errors::EngineError;
use room_controller::types::{ConsumerId, ProducerId, RouterId, TransportId};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Inner {
    seq: u64,
    routers: HashSet<String>,
    transports: HashMap<String, TransportDirection>,
    connected_transports: HashSet<String>,
    producers: HashMap<String, MediaKind>,
    /// consumer id -> bound producer id
    consumers: HashMap<String, String>,
    paused_consumers: HashSet<String>,
    /// Close calls in order, as "kind:id" entries.
    closed: Vec<String>,
    reject_consume: bool,
    fail_transport_connect: bool,
    fail_produce: bool,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{prefix}-{}", self.seq)
    }
}

/// Mock [`MediaEngine`] for testing.
pub struct MockMediaEngine {
    inner: Mutex<Inner>,
    death: CancellationToken,
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            death: CancellationToken::new(),
        }
    }

    /// Make every capability check fail (builder form).
    #[must_use]
    pub fn with_reject_consume(self) -> Self {
        self.inner.lock().reject_consume = true;
        self
    }

    /// Toggle capability-check rejection at runtime.
    pub fn reject_consume(&self, reject: bool) {
        self.inner.lock().reject_consume = reject;
    }

    /// Make the next and all following transport handshakes fail.
    pub fn fail_transport_connect(&self, fail: bool) {
        self.inner.lock().fail_transport_connect = fail;
    }

    /// Make produce calls fail.
    pub fn fail_produce(&self, fail: bool) {
        self.inner.lock().fail_produce = fail;
    }

    /// Simulate the engine worker process dying.
    pub fn kill_worker(&self) {
        self.death.cancel();
    }

    // ------------------------------------------------------------------
    // State assertions
    // ------------------------------------------------------------------

    pub fn router_open(&self, id: &str) -> bool {
        self.inner.lock().routers.contains(id)
    }

    pub fn transport_open(&self, id: &str) -> bool {
        self.inner.lock().transports.contains_key(id)
    }

    pub fn transport_connected(&self, id: &str) -> bool {
        self.inner.lock().connected_transports.contains(id)
    }

    pub fn producer_open(&self, id: &str) -> bool {
        self.inner.lock().producers.contains_key(id)
    }

    pub fn consumer_open(&self, id: &str) -> bool {
        self.inner.lock().consumers.contains_key(id)
    }

    pub fn consumer_paused(&self, id: &str) -> bool {
        self.inner.lock().paused_consumers.contains(id)
    }

    pub fn open_router_count(&self) -> usize {
        self.inner.lock().routers.len()
    }

    /// Open transports + producers + consumers.
    pub fn open_resource_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.transports.len() + inner.producers.len() + inner.consumers.len()
    }

    /// Every close call so far, in order, as "kind:id" entries.
    pub fn closed_order(&self) -> Vec<String> {
        self.inner.lock().closed.clone()
    }

    pub fn was_closed(&self, kind_and_id: &str) -> bool {
        self.inner.lock().closed.iter().any(|c| c == kind_and_id)
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn create_router(
        &self,
        media_codecs: &[CodecCapability],
    ) -> Result<RouterHandle, EngineError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id("rtr");
        inner.routers.insert(id.clone());

        let codecs = serde_json::to_value(media_codecs)
            .map_err(|e| EngineError::Rejected(format!("bad codec config: {e}")))?;
        Ok(RouterHandle {
            id: RouterId::from(id),
            rtp_capabilities: RtpCapabilities(json!({ "codecs": codecs })),
            raw: Arc::new(()),
        })
    }

    async fn create_transport(
        &self,
        router: &RouterHandle,
        direction: TransportDirection,
        network: &NetworkConfig,
    ) -> Result<(TransportHandle, TransportDescriptor), EngineError> {
        let mut inner = self.inner.lock();
        if !inner.routers.contains(router.id.as_str()) {
            return Err(EngineError::Rejected(format!(
                "unknown router {}",
                router.id
            )));
        }

        let id = inner.next_id("trn");
        inner.transports.insert(id.clone(), direction);

        let handle = TransportHandle {
            id: TransportId::from(id.clone()),
            direction,
            raw: Arc::new(()),
        };
        let descriptor = TransportDescriptor {
            id: TransportId::from(id.clone()),
            ice_parameters: IceParameters(json!({
                "usernameFragment": format!("ufrag-{id}"),
                "password": format!("pwd-{id}"),
            })),
            ice_candidates: vec![IceCandidate(json!({
                "foundation": "mock",
                "ip": network.announced_ip.as_deref().unwrap_or(&network.listen_ip),
                "port": network.rtc_min_port,
                "protocol": if network.prefer_udp { "udp" } else { "tcp" },
            }))],
            dtls_parameters: DtlsParameters(json!({
                "role": "auto",
                "fingerprints": [{"algorithm": "sha-256", "value": format!("fp-{id}")}],
            })),
        };
        Ok((handle, descriptor))
    }

    async fn connect_transport(
        &self,
        transport: &TransportHandle,
        _dtls_parameters: DtlsParameters,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.fail_transport_connect {
            return Err(EngineError::Rejected("injected handshake failure".to_string()));
        }
        if !inner.transports.contains_key(transport.id.as_str()) {
            return Err(EngineError::Rejected(format!(
                "unknown transport {}",
                transport.id
            )));
        }
        inner
            .connected_transports
            .insert(transport.id.as_str().to_string());
        Ok(())
    }

    async fn produce(
        &self,
        transport: &TransportHandle,
        kind: MediaKind,
        _rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle, EngineError> {
        let mut inner = self.inner.lock();
        if inner.fail_produce {
            return Err(EngineError::Rejected("injected produce failure".to_string()));
        }
        match inner.transports.get(transport.id.as_str()) {
            Some(TransportDirection::Send) => {}
            Some(TransportDirection::Recv) => {
                return Err(EngineError::Rejected(
                    "produce requires a send transport".to_string(),
                ))
            }
            None => {
                return Err(EngineError::Rejected(format!(
                    "unknown transport {}",
                    transport.id
                )))
            }
        }
        if !inner.connected_transports.contains(transport.id.as_str()) {
            return Err(EngineError::Rejected(
                "transport is not connected".to_string(),
            ));
        }

        let id = inner.next_id("prd");
        inner.producers.insert(id.clone(), kind);
        Ok(ProducerHandle {
            id: ProducerId::from(id),
            kind,
            raw: Arc::new(()),
        })
    }

    async fn can_consume(
        &self,
        router: &RouterHandle,
        producer_id: &ProducerId,
        _rtp_capabilities: &RtpCapabilities,
    ) -> Result<bool, EngineError> {
        let inner = self.inner.lock();
        Ok(!inner.reject_consume
            && inner.routers.contains(router.id.as_str())
            && inner.producers.contains_key(producer_id.as_str()))
    }

    async fn consume(
        &self,
        transport: &TransportHandle,
        producer_id: &ProducerId,
        _rtp_capabilities: &RtpCapabilities,
    ) -> Result<(ConsumerHandle, ConsumerDescriptor), EngineError> {
        let mut inner = self.inner.lock();
        match inner.transports.get(transport.id.as_str()) {
            Some(TransportDirection::Recv) => {}
            Some(TransportDirection::Send) => {
                return Err(EngineError::Rejected(
                    "consume requires a receive transport".to_string(),
                ))
            }
            None => {
                return Err(EngineError::Rejected(format!(
                    "unknown transport {}",
                    transport.id
                )))
            }
        }
        if !inner.connected_transports.contains(transport.id.as_str()) {
            return Err(EngineError::Rejected(
                "transport is not connected".to_string(),
            ));
        }
        let Some(kind) = inner.producers.get(producer_id.as_str()).copied() else {
            return Err(EngineError::Rejected(format!(
                "unknown producer {producer_id}"
            )));
        };

        let id = inner.next_id("cns");
        inner
            .consumers
            .insert(id.clone(), producer_id.as_str().to_string());
        // Paused until the client resumes.
        inner.paused_consumers.insert(id.clone());

        let handle = ConsumerHandle {
            id: ConsumerId::from(id.clone()),
            producer_id: producer_id.clone(),
            raw: Arc::new(()),
        };
        let descriptor = ConsumerDescriptor {
            id: ConsumerId::from(id),
            producer_id: producer_id.clone(),
            kind,
            rtp_parameters: RtpParameters(json!({
                "boundTo": producer_id.as_str(),
            })),
        };
        Ok((handle, descriptor))
    }

    async fn resume_consumer(&self, consumer: &ConsumerHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if !inner.consumers.contains_key(consumer.id.as_str()) {
            return Err(EngineError::Rejected(format!(
                "unknown consumer {}",
                consumer.id
            )));
        }
        inner.paused_consumers.remove(consumer.id.as_str());
        Ok(())
    }

    async fn close_router(&self, router: &RouterHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.routers.remove(router.id.as_str()) {
            let entry = format!("router:{}", router.id);
            inner.closed.push(entry);
        }
        Ok(())
    }

    async fn close_transport(&self, transport: &TransportHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.transports.remove(transport.id.as_str()).is_some() {
            inner.connected_transports.remove(transport.id.as_str());
            let entry = format!("transport:{}", transport.id);
            inner.closed.push(entry);
        }
        Ok(())
    }

    async fn close_producer(&self, producer: &ProducerHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.producers.remove(producer.id.as_str()).is_some() {
            let entry = format!("producer:{}", producer.id);
            inner.closed.push(entry);
        }
        Ok(())
    }

    async fn close_consumer(&self, consumer: &ConsumerHandle) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.consumers.remove(consumer.id.as_str()).is_some() {
            inner.paused_consumers.remove(consumer.id.as_str());
            let entry = format!("consumer:{}", consumer.id);
            inner.closed.push(entry);
        }
        Ok(())
    }

    fn death_signal(&self) -> CancellationToken {
        self.death.clone()
    }
}
