//! End-to-end tests for the mining loop against in-memory backends

use chainweb_miner::cache::TargetCache;
use chainweb_miner::coordinator::MiningCoordinator;
use chainweb_miner::cut::Cut;
use chainweb_miner::extend::CutExtender;
use chainweb_miner::store::{
    CutStore, DevExecutor, HeaderDbSet, MemCutStore, MemHeaderDbSet, MemPayloadStore,
};
use chainweb_miner::types::{BlockHeight, ChainId, MinerInfo, Nonce, Target};
use chainweb_miner::{ChainwebVersion, Error, MinerConfig};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_test_writer())
        .with(filter)
        .try_init();
}

struct TestNode {
    version: ChainwebVersion,
    dbs: Arc<MemHeaderDbSet>,
    payloads: Arc<MemPayloadStore>,
    executor: Arc<DevExecutor>,
    cut_store: Arc<MemCutStore>,
}

fn node(version: ChainwebVersion) -> TestNode {
    init_tracing();
    let dbs = Arc::new(MemHeaderDbSet::new(version));
    let cut_store = Arc::new(MemCutStore::new(Cut::genesis(version), dbs.clone()));
    TestNode {
        version,
        dbs,
        payloads: Arc::new(MemPayloadStore::new()),
        executor: Arc::new(DevExecutor::new()),
        cut_store,
    }
}

fn miner_info() -> MinerInfo {
    let key = "87ef8fdb229ad10285ae191a168ea2ec0794621a127df21e372f41fd0246e4cf";
    MinerInfo::new(MinerInfo::default_account(key), key).unwrap()
}

fn coordinator(node: &TestNode) -> Arc<MiningCoordinator> {
    Arc::new(MiningCoordinator::new(
        node.version,
        MinerConfig::new(miner_info()),
        node.cut_store.clone(),
        node.executor.clone(),
        node.dbs.clone(),
        node.payloads.clone(),
    ))
}

fn extender(node: &TestNode) -> CutExtender {
    CutExtender::new(
        node.version,
        miner_info(),
        node.executor.clone(),
        node.dbs.clone(),
        node.payloads.clone(),
    )
}

/// A one-chain chainweb with the trivial maximum target advances from
/// genesis on the first attempt.
#[tokio::test]
async fn single_chain_genesis_extension() {
    let node = node(ChainwebVersion::TestSingleton);
    let genesis = node.cut_store.current().await;

    let coord = coordinator(&node);
    let handle = tokio::spawn({
        let coord = coord.clone();
        async move { coord.run_forever().await }
    });

    let observed = timeout(Duration::from_secs(10), node.cut_store.await_newer(&genesis))
        .await
        .expect("miner made no progress")
        .unwrap();
    handle.abort();

    let tip = observed.header(ChainId::new(0)).unwrap();
    assert!(tip.height.value() >= 1);
    assert!(tip.meets_own_target());
    observed.check_braiding().unwrap();

    // Both the payload and the header were persisted
    assert!(node.payloads.contains(&tip.payload_hash));
    assert!(node
        .dbs
        .chain_db(ChainId::new(0))
        .unwrap()
        .contains(&tip.block_hash()));
}

/// With chain 0 two blocks ahead of its only adjacent, mining rotates
/// to the free chain until the dependency is satisfied.
#[tokio::test]
async fn blocked_adjacent_parent_rotates() {
    let version = ChainwebVersion::TestPair;
    let node = node(version);
    let chain_a = ChainId::new(0);
    let chain_b = ChainId::new(1);

    // Fabricated staggered cut: A@5, B@3
    let mut a = version.genesis_header(chain_a);
    a.height = BlockHeight::new(5);
    let mut b = version.genesis_header(chain_b);
    b.height = BlockHeight::new(3);
    let mut headers = BTreeMap::new();
    headers.insert(chain_a, a);
    headers.insert(chain_b, b);
    let mut cut = Cut::from_headers(version, headers).unwrap();

    let ext = extender(&node);
    let mut cache = TargetCache::new();
    let mut rng = SmallRng::seed_from_u64(11);
    let cancel = CancellationToken::new();

    // While B trails at heights 3 and 4, A stays blocked, so the next
    // two blocks must land on B no matter which chain is sampled first.
    for expected_height in [4u64, 5u64] {
        let e = ext
            .extend(&cut, Nonce::new(expected_height), &mut cache, &mut rng, &cancel)
            .await
            .unwrap();
        assert_eq!(e.header.chain_id, chain_b);
        assert_eq!(e.header.height, BlockHeight::new(expected_height));
        cut = e.cut;
    }

    // With B caught up to A's height, A resolves its adjacent parent
    // and mines
    let parent = cut.header(chain_a).unwrap().clone();
    let mut adjacents = chainweb_miner::types::BlockHashRecord::new();
    adjacents.insert(chain_b, cut.header(chain_b).unwrap().block_hash());
    let candidate = chainweb_miner::header::BlockHeader {
        nonce: Nonce::new(0),
        creation_time: chainweb_miner::types::Time::EPOCH,
        parent: parent.block_hash(),
        adjacents,
        target: parent.target,
        payload_hash: parent.payload_hash,
        chain_id: chain_a,
        height: parent.height.succ(),
        version,
    };
    let mined = chainweb_miner::miner::mine_header(
        &candidate,
        Nonce::new(9),
        &cancel,
        chainweb_miner::types::Time::now,
    )
    .await
    .unwrap();

    let extended = cut.extend(&mined).unwrap();
    assert_eq!(
        extended.header(chain_a).unwrap().height,
        BlockHeight::new(6)
    );
    extended.check_braiding().unwrap();
}

/// A cut published while an attempt is in flight preempts it; the
/// discarded attempt must leave no trace in the stores.
#[tokio::test]
async fn preemption_discards_work() {
    let node = node(ChainwebVersion::TestSingleton);
    let cid = ChainId::new(0);

    // Unreachable difficulty: the attempt can only end by preemption
    node.dbs
        .chain_db(cid)
        .unwrap()
        .set_oracle(Box::new(|_| Target::min()));

    let genesis = node.cut_store.current().await;
    let coord = coordinator(&node);
    let handle = tokio::spawn({
        let coord = coord.clone();
        async move { coord.run_forever().await }
    });

    // Wait until the first attempt has requested its payload and is
    // grinding nonces
    timeout(Duration::from_secs(5), async {
        while node.executor.new_block_calls() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("miner never started an attempt");
    tokio::time::sleep(Duration::from_millis(300)).await;

    // A peer extends the cut with an easy block of its own
    let g = genesis.header(cid).unwrap().clone();
    let mut peer_block = g.clone();
    peer_block.parent = g.block_hash();
    peer_block.height = g.height.succ();
    peer_block.nonce = Nonce::new(77);
    let peer_cut = genesis.extend(&peer_block).unwrap();
    node.dbs.insert(peer_block.clone()).await.unwrap();
    node.cut_store.publish(peer_cut.to_hashes(None)).await.unwrap();

    // The miner observes the new cut and restarts: a second payload
    // request follows
    timeout(Duration::from_secs(5), async {
        while node.executor.new_block_calls() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("preempted miner never restarted");
    handle.abort();

    // The discarded attempt wrote nothing: the only headers are the
    // genesis block and the peer's, and no payload was inserted
    assert!(node.payloads.is_empty());
    assert_eq!(node.dbs.total_headers(), 2);
    assert_eq!(node.cut_store.current().await, peer_cut);
}

/// Two attempts from the same parent consult the difficulty oracle
/// once; the second reads the cached target.
#[tokio::test]
async fn cached_target_is_reused() {
    let node = node(ChainwebVersion::TestSingleton);
    let cid = ChainId::new(0);
    let fixed = Target::new([u64::MAX, u64::MAX, u64::MAX, u64::MAX >> 1]);
    node.dbs
        .chain_db(cid)
        .unwrap()
        .set_oracle(Box::new(move |_| fixed));

    let cut = node.cut_store.current().await;
    let ext = extender(&node);
    let mut cache = TargetCache::new();
    let mut rng = SmallRng::seed_from_u64(3);
    let cancel = CancellationToken::new();

    let e1 = ext
        .extend(&cut, Nonce::new(10), &mut cache, &mut rng, &cancel)
        .await
        .unwrap();
    let e2 = ext
        .extend(&cut, Nonce::new(20), &mut cache, &mut rng, &cancel)
        .await
        .unwrap();

    assert_eq!(e1.header.target, fixed);
    assert_eq!(e2.header.target, fixed);
    assert_eq!(node.dbs.chain_db(cid).unwrap().oracle_consultations(), 1);
}

/// Mining a three-chain web to height 12 with a window of 5 keeps the
/// cache bounded and every entry within the window.
#[tokio::test]
async fn cache_is_pruned_within_window() {
    let version = ChainwebVersion::TestTriangle;
    let window = version.window().unwrap();
    assert_eq!(window, 5);

    let node = node(version);
    let ext = extender(&node);
    let mut cut = node.cut_store.current().await;
    let mut cache = TargetCache::new();
    let mut rng = SmallRng::seed_from_u64(5);
    let cancel = CancellationToken::new();

    let mut last_height = BlockHeight::new(0);
    for round in 0..200u64 {
        let e = ext
            .extend(&cut, Nonce::new(round), &mut cache, &mut rng, &cancel)
            .await
            .unwrap();
        last_height = e.header.height;
        cache.prune(last_height, window);
        cut = e.cut;
        cut.check_braiding().unwrap();
        if cut.max_block_height().value() >= 12 {
            break;
        }
    }
    assert_eq!(last_height.value(), 12);

    assert!(cache.len() as u32 <= version.chain_count() * window as u32);
    for height in cache.heights() {
        assert!(height.value() > 12 - window);
    }
}

/// Mining on a version without a difficulty window is a fatal
/// misconfiguration surfacing at the first success.
#[tokio::test]
async fn non_pow_version_aborts_the_miner() {
    let node = node(ChainwebVersion::TimedConsensus);
    let coord = coordinator(&node);

    let result = timeout(Duration::from_secs(10), coord.run_forever())
        .await
        .expect("misconfigured miner did not terminate");
    match result {
        Err(e @ Error::NonPowVersion { .. }) => {
            assert!(e.to_string().contains("POW miner used with non-POW chainweb"));
        }
        other => panic!("expected a non-PoW configuration error, got {other:?}"),
    }
}
