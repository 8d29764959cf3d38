//! Wires a transport, the forwarding pipeline, and NFP into one
//! runnable node. This is the "helper classes that wire nodes
//! together" layer: it contains no forwarding logic of its own, only
//! plumbing between the library crates.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use ccnf_common::name::Name;
use ccnf_common::packet::{ContentObject, Interest, Packet};
use ccnf_core::config::ForwarderConfig;
use ccnf_core::connection::{ConnectionId, ConnectionTable};
use ccnf_core::content_store::ContentStore;
use ccnf_core::fib::Fib;
use ccnf_core::forwarder::{ForwardError, Forwarder};
use ccnf_core::pit::Pit;
use ccnf_nfp::timers::PeriodicTimer;
use ccnf_nfp::RoutingProtocol;
use ccnf_transport::{QuicTransport, TransportConfig, TransportEvent, TransportMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

/// One assembled CCNF router: a QUIC transport, the forwarding
/// pipeline, and NFP, all pointed at each other.
pub struct Node {
    pub forwarder: Arc<Forwarder>,
    pub protocol: Arc<RoutingProtocol>,
    pub transport: Arc<QuicTransport>,
    connection_table: ConnectionTable,
    /// The sentinel connection this CLI process uses to express its
    /// own Interests (`interest`/`publish`), mirroring the way NFP
    /// binds a portal connection to receive traffic locally instead of
    /// forwarding it out over a face.
    local_client: ConnectionId,
    /// The sentinel connection NFP itself bound to `/nfp`. Packets the
    /// forwarder routes here are NFP payloads, not ordinary data.
    nfp_connection: ConnectionId,
    face_by_connection: Mutex<HashMap<ConnectionId, String>>,
    connection_by_face: Mutex<HashMap<String, ConnectionId>>,
    pending_interests: Mutex<HashMap<Name, oneshot::Sender<ContentObject>>>,
    served: HashMap<Name, bytes::Bytes>,
    /// Keeps NFP's Hello/Advertise/AnchorRoute/neighbor-tick timers
    /// alive; dropping a `PeriodicTimer` aborts it.
    _nfp_timers: Vec<PeriodicTimer>,
}

impl Node {
    pub async fn start(config: &NodeConfig) -> Result<Arc<Self>> {
        let pit = Pit::new(config.pit_config());
        let fib = Fib::new(config.fib_config());
        let content_store = ContentStore::new(config.content_store_config());
        let forwarder = Arc::new(Forwarder::new(
            ForwarderConfig::default(),
            pit,
            fib,
            Some(content_store),
        ));

        let connection_table = ConnectionTable::new();
        let local_client = connection_table.allocate().id();
        let nfp_connection = connection_table.allocate().id();

        let anchor_prefixes = config.anchor_prefixes.iter().map(|s| Name::from_uri(s)).collect();
        let protocol = RoutingProtocol::new(
            Name::from_uri(&config.router_name),
            nfp_connection,
            anchor_prefixes,
            Arc::clone(&forwarder),
            config.nfp_config(),
        );

        let transport_config = TransportConfig {
            mode: TransportMode::Dual,
            server_options: Some(config.server_options()),
            client_options: config.client_options(),
            ..TransportConfig::default()
        };
        let transport = Arc::new(
            QuicTransport::new(transport_config)
                .await
                .context("failed to start QUIC transport")?,
        );

        let served = config
            .served
            .iter()
            .map(|s| (Name::from_uri(&s.name), bytes::Bytes::from(s.content.clone().into_bytes())))
            .collect();

        let nfp_timers = protocol.spawn_timers();

        let node = Arc::new(Self {
            forwarder,
            protocol,
            transport,
            connection_table,
            local_client,
            nfp_connection,
            face_by_connection: Mutex::new(HashMap::new()),
            connection_by_face: Mutex::new(HashMap::new()),
            pending_interests: Mutex::new(HashMap::new()),
            served,
            _nfp_timers: nfp_timers,
        });

        for name in node.served.keys() {
            node.forwarder.add_route(local_client, name.clone());
        }

        // Bootstrap connectivity only: anything beyond `static_routes`
        // is left for NFP to learn via anchor advertisements once
        // neighbors exchange Hello.
        for (index, addr) in config.connect_to.iter().enumerate() {
            let face = node.transport.connect(addr.as_str()).await?;
            let connection = node.connection_table.allocate().id();
            node.bind_face(connection, face.id().to_string()).await;
            node.protocol.register_interface(connection, ccnf_transport::CCNF_QUIC_MTU);

            for route in &config.static_routes {
                if route.neighbor == index {
                    node.forwarder.add_route(connection, Name::from_uri(&route.prefix));
                }
            }
        }

        node.clone().spawn_dispatch_loop();
        Ok(node)
    }

    async fn bind_face(&self, connection: ConnectionId, face_id: String) {
        self.face_by_connection.lock().await.insert(connection, face_id.clone());
        self.connection_by_face.lock().await.insert(face_id, connection);
    }

    async fn connection_for_face(&self, face_id: &str) -> ConnectionId {
        if let Some(connection) = self.connection_by_face.lock().await.get(face_id) {
            return *connection;
        }
        let connection = self.connection_table.allocate().id();
        self.bind_face(connection, face_id.to_string()).await;
        self.protocol.register_interface(connection, ccnf_transport::CCNF_QUIC_MTU);
        connection
    }

    /// Sends a locally originated Interest and waits for the matching
    /// Data, the way a neighbor FIB entry would resolve it.
    pub async fn express_interest(self: &Arc<Self>, name: Name, timeout: Duration) -> Result<ContentObject> {
        let (tx, rx) = oneshot::channel();
        self.pending_interests.lock().await.insert(name.clone(), tx);

        let interest = Interest::new(name.clone()).with_lifetime(timeout);
        let node = self.clone();
        self.forwarder.route_output(Packet::Interest(interest), self.local_client, None, move |packet, ingress, error, egress| {
            node.dispatch_egress(packet, ingress, error, egress);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(content_object)) => Ok(content_object),
            Ok(Err(_)) => anyhow::bail!("interest for {name} was dropped before Data arrived"),
            Err(_) => {
                self.pending_interests.lock().await.remove(&name);
                anyhow::bail!("interest for {name} timed out");
            }
        }
    }

    /// Feeds transport events into the forwarder and routes the
    /// forwarder's dispatch decisions back out to the right face (or
    /// delivers them locally when the egress is one of this process's
    /// own sentinel connections).
    fn spawn_dispatch_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                match self.transport.next_event().await {
                    Some(TransportEvent::PacketReceived { packet, face_id }) => {
                        let ingress = self.connection_for_face(&face_id).await;
                        self.clone().route(packet, ingress);
                    }
                    Some(TransportEvent::FaceCreated(face_id)) => {
                        log::info!("face created: {face_id}");
                    }
                    Some(TransportEvent::FaceClosed(face_id)) => {
                        if let Some(connection) = self.connection_by_face.lock().await.remove(&face_id) {
                            self.face_by_connection.lock().await.remove(&connection);
                            self.forwarder.remove_connection(connection);
                            self.protocol.unregister_interface(connection);
                        }
                        log::info!("face closed: {face_id}");
                    }
                    Some(TransportEvent::Error(e)) => log::warn!("transport error: {e}"),
                    None => break,
                }
            }
        });
    }

    fn route(self: Arc<Self>, packet: Packet, ingress: ConnectionId) {
        let node = self.clone();
        self.forwarder.route_input(packet, ingress, move |packet, origin_ingress, error, egress| {
            node.dispatch_egress(packet, origin_ingress, error, egress);
        });
    }

    /// Shared by both inbound (`route_input`) and locally originated
    /// (`route_output`) dispatch: sends the packet out each egress
    /// connection, or hands it to NFP / this process's own pending
    /// state when the egress is one of the sentinel connections.
    fn dispatch_egress(self: Arc<Self>, packet: Packet, ingress: ConnectionId, error: Option<ForwardError>, egress: Vec<ConnectionId>) {
        if error.is_some() {
            return;
        }
        for connection in egress {
            if connection == self.nfp_connection {
                if let Packet::Interest(interest) = &packet {
                    self.protocol.receive_payload(interest.clone(), ingress);
                }
                continue;
            }
            if connection == self.local_client {
                let node = self.clone();
                let packet = packet.clone();
                tokio::spawn(async move { node.deliver_locally(packet).await });
                continue;
            }
            let node = self.clone();
            let packet = packet.clone();
            tokio::spawn(async move { node.send_to_connection(packet, connection).await });
        }
    }

    async fn send_to_connection(&self, packet: Packet, connection: ConnectionId) {
        let face_id = self.face_by_connection.lock().await.get(&connection).cloned();
        if let Some(face_id) = face_id {
            if let Err(e) = self.transport.send(&packet, &face_id).await {
                log::warn!("failed to send {} to {face_id}: {e}", packet.kind());
            }
        }
    }

    async fn deliver_locally(self: &Arc<Self>, packet: Packet) {
        match packet {
            Packet::Interest(interest) => {
                if let Some(content) = self.served.get(&interest.name) {
                    let content_object = ContentObject::new(interest.name.clone(), content.clone(), None);
                    let node = self.clone();
                    self.forwarder.route_output(Packet::ContentObject(content_object), self.local_client, None, move |packet, ingress, error, egress| {
                        node.dispatch_egress(packet, ingress, error, egress);
                    });
                }
            }
            Packet::ContentObject(content_object) => {
                if let Some(sender) = self.pending_interests.lock().await.remove(&content_object.name) {
                    let _ = sender.send(content_object);
                }
            }
            Packet::InterestReturn(_) => {}
        }
    }
}
