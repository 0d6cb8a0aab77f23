use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use hyphae_core::{
    async_util::timeout,
    crypto::{KeyPair, KeyPairType},
    Executor,
};
use hyphae_net::transports::memory::MemTransport;
use hyphae_p2p::{
    stream_handler, Config, Error, MuxStream, NetConn, Notifee, PeerID, PeerInfo, Swarm,
};

fn run<Fut: std::future::Future<Output = ()>>(f: impl FnOnce(Executor) -> Fut) {
    let ex = Arc::new(smol::Executor::new());
    smol::block_on(ex.clone().run(f(ex)));
}

async fn new_swarm(ex: Executor) -> (Arc<Swarm>, PeerID) {
    let kp = KeyPair::generate(&KeyPairType::Ed25519);
    let id = PeerID::from_public_key(&kp.public());
    let swarm = Swarm::new(kp, Arc::new(MemTransport), Config::default(), ex).await;
    (swarm, id)
}

async fn read_full(stream: &MuxStream, buf: &mut [u8]) -> hyphae_p2p::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        read += stream.read(&mut buf[read..]).await?;
    }
    Ok(())
}

#[test]
fn test_hello_end_to_end() {
    run(|ex| async move {
        let (s1, id1) = new_swarm(ex.clone()).await;
        let (s2, id2) = new_swarm(ex).await;

        s2.set_stream_handler(
            "/hello/1.0".to_string(),
            stream_handler(|stream: MuxStream| async move {
                let mut buf = [0u8; 4];
                read_full(&stream, &mut buf).await?;
                assert_eq!(&buf, b"ping");
                stream.write(b"pong").await?;
                Ok(())
            }),
        )
        .await;

        let endpoint = s2.listen(&"mem://0".parse().unwrap()).await.unwrap();

        let conn = s1
            .connect(&PeerInfo::new(id2.clone(), vec![endpoint]))
            .await
            .unwrap();
        assert_eq!(conn.peer_id(), &id2);

        let stream = s1
            .new_stream(&id2, &["/hello/1.0".to_string()])
            .await
            .unwrap();
        assert_eq!(stream.protocol().as_deref(), Some("/hello/1.0"));

        stream.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        read_full(&stream, &mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        // Both sides see the session.
        assert_eq!(s1.peers().await, vec![id2.clone()]);
        assert_eq!(s2.peers().await, vec![id1]);

        s1.close().await.unwrap();
        s2.close().await.unwrap();
    });
}

#[test]
fn test_unsupported_protocol() {
    run(|ex| async move {
        let (s1, _id1) = new_swarm(ex.clone()).await;
        let (s2, id2) = new_swarm(ex).await;

        let endpoint = s2.listen(&"mem://0".parse().unwrap()).await.unwrap();
        s1.peer_store()
            .add_addr(&id2, &endpoint, Duration::from_secs(60));

        let err = s1
            .new_stream(&id2, &["/nope/1.0".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NegotiationFailed));

        // The failed negotiation killed the stream, not the connection.
        let conn = s1.conn(&id2).await.unwrap();
        assert!(!conn.is_closed());

        s1.close().await.unwrap();
        s2.close().await.unwrap();
    });
}

#[test]
fn test_dial_dedup() {
    run(|ex| async move {
        let (s1, _id1) = new_swarm(ex.clone()).await;
        let (s2, id2) = new_swarm(ex).await;

        let endpoint = s2.listen(&"mem://0".parse().unwrap()).await.unwrap();
        s1.peer_store()
            .add_addr(&id2, &endpoint, Duration::from_secs(60));

        let mut tasks = vec![];
        for _ in 0..8 {
            let s1 = s1.clone();
            let id2 = id2.clone();
            tasks.push(smol::spawn(async move { s1.dial_peer(&id2).await.unwrap() }));
        }

        let mut conns: Vec<Arc<NetConn>> = vec![];
        for task in tasks {
            conns.push(task.await);
        }

        // One pipeline ran; every caller got the same connection.
        for conn in &conns {
            assert!(Arc::ptr_eq(&conns[0], conn));
        }
        assert_eq!(s1.conns().await.len(), 1);

        s1.close().await.unwrap();
        s2.close().await.unwrap();
    });
}

#[test]
fn test_cancelled_dial_releases_slot() {
    run(|ex| async move {
        let (s1, _id1) = new_swarm(ex.clone()).await;
        let (s2, id2) = new_swarm(ex).await;

        let endpoint = s2.listen(&"mem://0".parse().unwrap()).await.unwrap();
        s1.peer_store()
            .add_addr(&id2, &endpoint, Duration::from_secs(60));

        // Drop a dial mid-flight. The pipeline keeps running detached, so
        // the dedup slot is cleared once it finishes.
        let _ = timeout(Duration::ZERO, s1.dial_peer(&id2)).await;

        // A later dial must not park on the abandoned slot.
        let conn = timeout(Duration::from_secs(3), s1.dial_peer(&id2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conn.peer_id(), &id2);

        s1.close().await.unwrap();
        s2.close().await.unwrap();
    });
}

#[test]
fn test_dial_unknown_peer() {
    run(|ex| async move {
        let (s1, _) = new_swarm(ex).await;

        let stranger = PeerID::random();
        let err = s1.dial_peer(&stranger).await.unwrap_err();
        assert!(matches!(err, Error::NoAddrs(_)));

        s1.close().await.unwrap();
    });
}

struct EventCapture {
    events: async_channel::Sender<String>,
}

#[async_trait]
impl Notifee for EventCapture {
    async fn connected(&self, conn: &Arc<NetConn>) {
        let _ = self.events.send(format!("connected:{}", conn.peer_id())).await;
    }

    async fn disconnected(&self, conn: &Arc<NetConn>) {
        let _ = self
            .events
            .send(format!("disconnected:{}", conn.peer_id()))
            .await;
    }
}

#[test]
fn test_disconnect_notification() {
    run(|ex| async move {
        let (s1, id1) = new_swarm(ex.clone()).await;
        let (s2, id2) = new_swarm(ex).await;

        let (tx, rx) = async_channel::unbounded();
        s1.register_notifee(Arc::new(EventCapture { events: tx })).await;

        let endpoint = s2.listen(&"mem://0".parse().unwrap()).await.unwrap();
        s1.peer_store()
            .add_addr(&id2, &endpoint, Duration::from_secs(60));
        s1.dial_peer(&id2).await.unwrap();

        let event = timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, format!("connected:{id2}"));

        // The remote side drops the session; this side must notice and
        // dispatch the disconnect.
        s2.close_peer(&id1).await.unwrap();

        let event = timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, format!("disconnected:{id2}"));
        assert!(s1.peers().await.is_empty());

        s1.close().await.unwrap();
        s2.close().await.unwrap();
    });
}
