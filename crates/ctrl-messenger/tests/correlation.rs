//! Outbound calls: reply correlation, timeouts, cancellation and cleanup.

mod common;

use common::{addr, eventually, ia, serve, Fixture};
use ctrl_messenger::{handler_fn, HandlerResult, Messenger, MessengerError, Request, TransportError};
use ctrl_types::{
    Ack, Context, HpCfg, HpCfgReply, HpCfgReq, HpGroupId, HpSegRecs, HpSegReg, HpSegReply,
    HpSegReq, IfId, MessageType, Payload,
};
use proptest::prelude::*;
use std::time::Duration;

const REGISTRY_IA: &str = "1-ff00:0:110";
const CLIENT_IA: &str = "1-ff00:0:111";

fn group() -> HpGroupId {
    HpGroupId {
        owner_as: 0xff00_0000_0110,
        suffix: 7,
    }
}

fn seg_req() -> HpSegReq {
    HpSegReq {
        dst_ia: ia("2-ff00:0:220"),
        group_ids: vec![group()],
    }
}

fn seg_reg() -> HpSegReg {
    HpSegReg {
        recs: HpSegRecs {
            group_id: group(),
            segments: vec![b"segment".to_vec()],
            err: String::new(),
        },
    }
}

/// Answers segment requests with one record per requested group and config
/// requests by echoing the change id.
fn registry(fixture: &Fixture) -> Messenger {
    let registry = fixture.messenger(1, REGISTRY_IA);
    registry
        .add_handler(
            MessageType::HpSegRequest,
            handler_fn(|mut request: Request| async move {
                let Payload::HpSegRequest(req) = &request.payload else {
                    return HandlerResult::client_error("wrong payload");
                };
                let reply = HpSegReply {
                    recs: req
                        .group_ids
                        .iter()
                        .map(|id| HpSegRecs {
                            group_id: *id,
                            segments: vec![b"segment".to_vec()],
                            err: String::new(),
                        })
                        .collect(),
                };
                let Some(writer) = request.take_writer() else {
                    return HandlerResult::internal_error("no writer");
                };
                match writer.send_hp_seg_reply(&request.ctx, reply).await {
                    Ok(()) => HandlerResult::ok(),
                    Err(err) => HandlerResult::internal_error(err.to_string()),
                }
            }),
        )
        .unwrap();
    registry
        .add_handler(
            MessageType::HpCfgRequest,
            handler_fn(|mut request: Request| async move {
                let Payload::HpCfgRequest(req) = &request.payload else {
                    return HandlerResult::client_error("wrong payload");
                };
                let reply = HpCfgReply {
                    change_id: req.change_id,
                    cfgs: vec![HpCfg {
                        group_id: group(),
                        version: req.change_id,
                        owner: ia(REGISTRY_IA),
                        writers: vec![ia(CLIENT_IA)],
                        readers: vec![],
                        registries: vec![ia(REGISTRY_IA)],
                    }],
                };
                let Some(writer) = request.take_writer() else {
                    return HandlerResult::internal_error("no writer");
                };
                match writer.send_hp_cfg_reply(&request.ctx, reply).await {
                    Ok(()) => HandlerResult::ok(),
                    Err(err) => HandlerResult::internal_error(err.to_string()),
                }
            }),
        )
        .unwrap();
    registry
        .add_handler(
            MessageType::HpSegReg,
            handler_fn(|request: Request| async move {
                match &request.payload {
                    Payload::HpSegReg(reg) if reg.recs.segments.is_empty() => {
                        HandlerResult::client_error("no segments")
                    }
                    Payload::HpSegReg(_) => HandlerResult::acknowledged(),
                    _ => HandlerResult::client_error("wrong payload"),
                }
            }),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_get_hp_segs_returns_correlated_reply() {
    let fixture = Fixture::new();
    let registry = registry(&fixture);
    let client = fixture.messenger(2, CLIENT_IA);
    let _r = serve(&registry);
    let _c = serve(&client);

    let reply = client
        .get_hp_segs(&Context::background(), seg_req(), addr(1), 100)
        .await
        .unwrap();
    assert_eq!(reply.recs.len(), 1);
    assert_eq!(reply.recs[0].group_id, group());

    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.pending_stats().snapshot().completed, 1);

    client.close_server().await.unwrap();
    registry.close_server().await.unwrap();
}

#[tokio::test]
async fn test_get_hp_cfgs_returns_correlated_reply() {
    let fixture = Fixture::new();
    let registry = registry(&fixture);
    let client = fixture.messenger(2, CLIENT_IA);
    let _r = serve(&registry);
    let _c = serve(&client);

    let reply = client
        .get_hp_cfgs(&Context::background(), HpCfgReq { change_id: 17 }, addr(1), 101)
        .await
        .unwrap();
    assert_eq!(reply.change_id, 17);
    assert_eq!(reply.cfgs[0].writers, vec![ia(CLIENT_IA)]);

    client.close_server().await.unwrap();
    registry.close_server().await.unwrap();
}

#[tokio::test]
async fn test_send_hp_seg_reg_acked_and_rejected() {
    let fixture = Fixture::new();
    let registry = registry(&fixture);
    let client = fixture.messenger(2, CLIENT_IA);
    let _r = serve(&registry);
    let _c = serve(&client);
    let ctx = Context::background();

    client
        .send_hp_seg_reg(&ctx, seg_reg(), addr(1), 200)
        .await
        .unwrap();

    let mut empty = seg_reg();
    empty.recs.segments.clear();
    match client.send_hp_seg_reg(&ctx, empty, addr(1), 201).await {
        Err(MessengerError::Rejected { request_id, ack }) => {
            assert_eq!(request_id, 201);
            assert_eq!(ack, Ack::reject("no segments"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    client.close_server().await.unwrap();
    registry.close_server().await.unwrap();
}

#[tokio::test]
async fn test_one_way_sends_reach_peer() {
    let fixture = Fixture::new();
    let client = fixture.messenger(2, CLIENT_IA);
    let peer = fixture.raw_peer(1, REGISTRY_IA);
    let ctx = Context::background();

    client
        .send_if_id(&ctx, IfId { orig_if: 5 }, addr(1), 1)
        .await
        .unwrap();
    client.send_ack(&ctx, Ack::ok(), addr(1), 2).await.unwrap();
    client
        .send_hp_seg_reply(&ctx, HpSegReply { recs: vec![] }, addr(1), 3)
        .await
        .unwrap();
    client
        .send_hp_cfg_reply(
            &ctx,
            HpCfgReply {
                change_id: 0,
                cfgs: vec![],
            },
            addr(1),
            4,
        )
        .await
        .unwrap();

    let types: Vec<_> = [
        peer.recv().await,
        peer.recv().await,
        peer.recv().await,
        peer.recv().await,
    ]
    .into_iter()
    .map(|m| (m.request_id, m.payload.message_type()))
    .collect();
    assert_eq!(
        types,
        vec![
            (1, MessageType::IfId),
            (2, MessageType::Ack),
            (3, MessageType::HpSegReply),
            (4, MessageType::HpCfgReply),
        ]
    );
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_releases_pending_request() {
    let fixture = Fixture::new();
    // Bound but never serving: the request is swallowed.
    let _silent = fixture.raw_peer(1, REGISTRY_IA);
    let client = fixture.messenger(2, CLIENT_IA);
    let _c = serve(&client);

    let ctx = Context::background().with_timeout(Duration::from_millis(300));
    let err = client
        .get_hp_segs(&ctx, seg_req(), addr(1), 300)
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Timeout { request_id: 300 }));
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.pending_stats().snapshot().timeouts, 1);

    client.close_server().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_default_request_timeout_applies() {
    let fixture = Fixture::new();
    let _silent = fixture.raw_peer(1, REGISTRY_IA);
    let client = fixture.messenger(2, CLIENT_IA);
    let _c = serve(&client);

    let started = tokio::time::Instant::now();
    let err = client
        .get_hp_cfgs(&Context::background(), HpCfgReq { change_id: 1 }, addr(1), 301)
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(started.elapsed() >= client.config().request_timeout);

    client.close_server().await.unwrap();
}

#[tokio::test]
async fn test_cancellation_releases_pending_request() {
    let fixture = Fixture::new();
    let _silent = fixture.raw_peer(1, REGISTRY_IA);
    let client = fixture.messenger(2, CLIENT_IA);
    let _c = serve(&client);

    let (ctx, cancel) = Context::background().with_cancel();
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.get_hp_segs(&ctx, seg_req(), addr(1), 400).await })
    };
    assert!(eventually(|| client.pending_count() == 1).await);

    cancel.cancel();
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, MessengerError::Cancelled { request_id: 400 }));
    assert_eq!(client.pending_count(), 0);

    client.close_server().await.unwrap();
}

#[tokio::test]
async fn test_dropped_call_releases_pending_request() {
    let fixture = Fixture::new();
    let _silent = fixture.raw_peer(1, REGISTRY_IA);
    let client = fixture.messenger(2, CLIENT_IA);

    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get_hp_segs(&Context::background(), seg_req(), addr(1), 401)
                .await
        })
    };
    assert!(eventually(|| client.pending_count() == 1).await);

    call.abort();
    assert!(eventually(|| client.pending_count() == 0).await);
    assert_eq!(client.pending_stats().snapshot().cancelled, 1);
}

#[tokio::test]
async fn test_send_failure_is_immediate_and_clean() {
    let fixture = Fixture::new();
    let client = fixture.messenger(2, CLIENT_IA);

    let err = client
        .get_hp_segs(&Context::background(), seg_req(), addr(9), 500)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MessengerError::Transport(TransportError::Unreachable(to)) if to == addr(9)
    ));
    assert_eq!(client.pending_count(), 0);

    let err = client
        .send_if_id(&Context::background(), IfId { orig_if: 1 }, addr(9), 501)
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Transport(_)));
}

#[tokio::test]
async fn test_duplicate_outstanding_id_rejected() {
    let fixture = Fixture::new();
    let _silent = fixture.raw_peer(1, REGISTRY_IA);
    let client = fixture.messenger(2, CLIENT_IA);

    let first = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get_hp_segs(&Context::background(), seg_req(), addr(1), 600)
                .await
        })
    };
    assert!(eventually(|| client.pending_count() == 1).await);

    let err = client
        .get_hp_cfgs(&Context::background(), HpCfgReq { change_id: 0 }, addr(1), 600)
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::DuplicateRequestId(600)));
    first.abort();
}

#[tokio::test]
async fn test_late_reply_dropped_and_never_resolves_reused_id() {
    let fixture = Fixture::new();
    let slow = fixture.raw_peer(1, REGISTRY_IA);
    let _other = fixture.raw_peer(3, "1-ff00:0:112");
    let client = fixture.messenger(2, CLIENT_IA);
    let _c = serve(&client);

    let ctx = Context::background().with_timeout(Duration::from_millis(50));
    let err = client
        .get_hp_segs(&ctx, seg_req(), addr(1), 700)
        .await
        .unwrap_err();
    assert!(matches!(err, MessengerError::Timeout { .. }));
    let request = slow.recv().await;
    assert_eq!(request.request_id, 700);

    // Reuse the id towards a different peer, then let the late reply land.
    let reused = {
        let client = client.clone();
        tokio::spawn(async move {
            let ctx = Context::background().with_timeout(Duration::from_millis(300));
            client.get_hp_segs(&ctx, seg_req(), addr(3), 700).await
        })
    };
    assert!(eventually(|| client.pending_count() == 1).await);

    slow.send(Payload::HpSegReply(HpSegReply { recs: vec![] }), addr(2), 700)
        .await;

    assert!(eventually(|| client.dispatch_stats().dropped_unmatched == 1).await);
    assert!(matches!(
        reused.await.unwrap(),
        Err(MessengerError::Timeout { request_id: 700 })
    ));
    assert_eq!(client.dispatch_stats().replies_correlated, 0);

    client.close_server().await.unwrap();
}

#[tokio::test]
async fn test_close_fails_pending_calls() {
    let fixture = Fixture::new();
    let _silent = fixture.raw_peer(1, REGISTRY_IA);
    let client = fixture.messenger(2, CLIENT_IA);
    let _c = serve(&client);

    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .get_hp_segs(&Context::background(), seg_req(), addr(1), 800)
                .await
        })
    };
    assert!(eventually(|| client.pending_count() == 1).await);

    client.close_server().await.unwrap();
    assert!(matches!(call.await.unwrap(), Err(MessengerError::Closed)));
    assert_eq!(client.pending_stats().snapshot().closed, 1);

    assert!(matches!(
        client
            .send_if_id(&Context::background(), IfId { orig_if: 1 }, addr(1), 801)
            .await,
        Err(MessengerError::Closed)
    ));
}

async fn concurrent_calls(ids: Vec<u64>) {
    let fixture = Fixture::new();
    let registry = registry(&fixture);
    let client = fixture.messenger(2, CLIENT_IA);
    let _r = serve(&registry);
    let _c = serve(&client);

    let calls: Vec<_> = ids
        .iter()
        .map(|&id| {
            let client = client.clone();
            tokio::spawn(async move {
                let req = HpCfgReq { change_id: id };
                let reply = client
                    .get_hp_cfgs(&Context::background(), req, addr(1), id)
                    .await;
                (id, reply)
            })
        })
        .collect();

    for call in calls {
        let (id, reply) = call.await.unwrap();
        assert_eq!(reply.unwrap().change_id, id);
    }
    assert_eq!(client.pending_count(), 0);

    client.close_server().await.unwrap();
    registry.close_server().await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: concurrent calls with distinct ids each resolve to their own reply.
    #[test]
    fn prop_concurrent_calls_receive_their_own_replies(
        ids in prop::collection::hash_set(any::<u64>(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(concurrent_calls(ids.into_iter().collect()));
    }
}
