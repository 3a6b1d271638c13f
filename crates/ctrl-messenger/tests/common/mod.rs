//! Shared fixtures: messengers on an in-memory network sharing one trust store.

#![allow(dead_code)]

use ctrl_messenger::{
    MemoryNetwork, MemoryTransport, Messenger, MessengerConfig, MessengerError, Transport,
};
use ctrl_types::{codec, Envelope, IsdAs, Payload, RequestId};
use ctrl_verify::{HmacSigner, HmacVerifier, Signer, TrustStore, Verifier, VerifierConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub fn ia(s: &str) -> IsdAs {
    s.parse().unwrap()
}

pub fn addr(host: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, host], 30041))
}

pub fn secret_for(ia: IsdAs) -> Vec<u8> {
    format!("secret-{ia}").into_bytes()
}

pub fn fast_config() -> MessengerConfig {
    MessengerConfig {
        request_timeout: Duration::from_secs(2),
        handler_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_millis(200),
        ..MessengerConfig::default()
    }
}

pub struct Fixture {
    pub network: MemoryNetwork,
    pub trust: TrustStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
            trust: TrustStore::new(),
        }
    }

    pub fn verifier(&self) -> Arc<dyn Verifier> {
        Arc::new(HmacVerifier::new(self.trust.clone(), VerifierConfig::default()))
    }

    /// A trusted messenger at `host`, not yet serving.
    pub fn messenger(&self, host: u8, issuer: &str) -> Messenger {
        self.messenger_with(host, issuer, fast_config(), self.verifier())
    }

    pub fn messenger_with(
        &self,
        host: u8,
        issuer: &str,
        config: MessengerConfig,
        verifier: Arc<dyn Verifier>,
    ) -> Messenger {
        let issuer = ia(issuer);
        self.trust.insert(issuer, secret_for(issuer));
        let transport = Arc::new(self.network.bind(addr(host)).unwrap());
        let signer = Arc::new(HmacSigner::new(issuer, secret_for(issuer)));
        Messenger::new(transport, signer, verifier, config).unwrap()
    }

    /// A bare endpoint that speaks the wire format by hand.
    pub fn raw_peer(&self, host: u8, issuer: &str) -> RawPeer {
        let issuer = ia(issuer);
        self.trust.insert(issuer, secret_for(issuer));
        self.untrusted_peer(host, issuer, secret_for(issuer))
    }

    /// A raw peer whose key the trust store does not know.
    pub fn untrusted_peer(&self, host: u8, issuer: IsdAs, key: Vec<u8>) -> RawPeer {
        RawPeer {
            transport: self.network.bind(addr(host)).unwrap(),
            signer: HmacSigner::new(issuer, key),
        }
    }
}

pub fn serve(messenger: &Messenger) -> JoinHandle<Result<(), MessengerError>> {
    let server = messenger.clone();
    tokio::spawn(async move { server.listen_and_serve().await })
}

/// Poll `cond` until it holds or a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub struct RawPeer {
    pub transport: MemoryTransport,
    pub signer: HmacSigner,
}

pub struct Received {
    pub request_id: RequestId,
    pub payload: Payload,
    pub from: SocketAddr,
}

impl RawPeer {
    pub fn addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub async fn send(&self, payload: Payload, to: SocketAddr, id: RequestId) {
        let message_type = payload.message_type();
        let body = codec::encode_payload(&payload).unwrap();
        let aad = Envelope::associated_data(message_type, id);
        let signed = self.signer.sign(&body, &[&aad[..]]).unwrap();
        let bytes = Envelope::new(message_type, id, signed)
            .to_bytes(usize::MAX)
            .unwrap();
        self.transport.send_to(&bytes, to).await.unwrap();
    }

    pub async fn recv(&self) -> Received {
        self.recv_within(Duration::from_secs(2))
            .await
            .expect("no message within deadline")
    }

    pub async fn recv_within(&self, wait: Duration) -> Option<Received> {
        let (bytes, from) = tokio::time::timeout(wait, self.transport.recv_from())
            .await
            .ok()?
            .unwrap();
        let envelope = Envelope::from_bytes(&bytes, usize::MAX).unwrap();
        let (_, body) = envelope.signed.decode_unverified().unwrap();
        let payload = codec::decode_payload(&body).unwrap();
        assert_eq!(payload.message_type(), envelope.message_type);
        Some(Received {
            request_id: envelope.request_id,
            payload,
            from,
        })
    }
}
