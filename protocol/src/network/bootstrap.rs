//! # Donor Bootstrap
//!
//! How a node joins an existing network. Given the address of one running
//! node (the donor), a joiner:
//!
//! 1. downloads the donor's peer list and adopts it (no re-broadcast);
//! 2. downloads the donor's identity and adds the donor itself as a peer;
//! 3. catches its chain up from the donor, page by page, feeding every
//!    block through [`Ledger::process_block`] so nothing is taken on trust;
//! 4. registers itself with the donor, which floods the news onward.
//!
//! Any transport failure aborts the whole sequence with a
//! [`BootstrapError`]. A node that cannot reach its donor has no business
//! serving a half-empty chain, so the caller is expected to exit.

use tracing::{debug, info, warn};

use super::client::NetworkError;
use super::node::Node;
use super::peers::PeerDirectory;
use crate::config::DEFAULT_PAGE_SIZE;
use crate::ledger::{Block, Ledger, LedgerError};

/// Why bootstrap gave up.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("donor address must not be blank")]
    BlankDonor,

    #[error("could not download peers from donor: {0}")]
    Peers(#[source] NetworkError),

    #[error("could not download donor identity: {0}")]
    Identity(#[source] NetworkError),

    #[error("could not add donor as a peer: {0}")]
    DonorRejected(#[source] NetworkError),

    #[error("could not download donor tip: {0}")]
    Tip(#[source] NetworkError),

    #[error("could not download chain page {page} from donor: {source}")]
    Chain {
        page: usize,
        #[source]
        source: NetworkError,
    },

    #[error("could not register with donor: {0}")]
    Register(#[source] NetworkError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What bootstrap changed locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Peers newly admitted, donor included.
    pub peers_learned: usize,
    /// Downloaded blocks appended to the local chain.
    pub blocks_applied: usize,
    /// Downloaded blocks the ledger refused (already held, or invalid).
    pub blocks_rejected: usize,
}

/// Join the network through `donor`. See the module docs for the steps.
pub async fn bootstrap(
    ledger: &Ledger,
    directory: &PeerDirectory,
    donor: &str,
    self_node: &Node,
) -> Result<BootstrapReport, BootstrapError> {
    if donor.trim().is_empty() {
        return Err(BootstrapError::BlankDonor);
    }
    let client = directory.client().clone();
    let mut report = BootstrapReport::default();
    info!(%donor, "bootstrapping from donor");

    // 1. Peers.
    let peers = client.download_peers(donor).await.map_err(BootstrapError::Peers)?;
    for peer in peers {
        if peer.has_blank_address() || self_node.same_address(&peer.address) {
            continue;
        }
        match directory.add_peer(peer, false) {
            Ok(admission) => report.peers_learned += usize::from(admission.added),
            Err(e) => debug!(error = %e, "skipping donor peer"),
        }
    }

    // 2. Donor identity.
    let info = client
        .download_peer_info(donor)
        .await
        .map_err(BootstrapError::Identity)?;
    if !self_node.same_address(&info.node.address) {
        let admission = directory
            .add_peer(info.node, false)
            .map_err(BootstrapError::DonorRejected)?;
        report.peers_learned += usize::from(admission.added);
    }

    // 3. Chain.
    let local_size = ledger.chain_size()?;
    let start_page = if local_size == 0 {
        Some(0)
    } else {
        let tip = client
            .download_latest_block(donor)
            .await
            .map_err(BootstrapError::Tip)?;
        let local_height = local_size - 1;
        match tip {
            Some(tip) if tip.height() > local_height => {
                Some((local_size / DEFAULT_PAGE_SIZE as u64) as usize)
            }
            _ => {
                info!(local_height, "local chain already caught up with donor");
                None
            }
        }
    };
    if let Some(start_page) = start_page {
        replay_chain(ledger, directory, donor, start_page, &mut report).await?;
    }

    // 4. Register.
    client
        .register_self(donor, self_node)
        .await
        .map_err(BootstrapError::Register)?;

    info!(
        peers_learned = report.peers_learned,
        blocks_applied = report.blocks_applied,
        blocks_rejected = report.blocks_rejected,
        "bootstrap complete"
    );
    Ok(report)
}

/// Pull pages from `start_page` until the donor returns an empty one.
async fn replay_chain(
    ledger: &Ledger,
    directory: &PeerDirectory,
    donor: &str,
    start_page: usize,
    report: &mut BootstrapReport,
) -> Result<(), BootstrapError> {
    let client = directory.client();
    let mut page = start_page;
    loop {
        let blocks: Vec<Block> = client
            .download_blockchain(donor, page)
            .await
            .map_err(|source| BootstrapError::Chain { page, source })?;
        if blocks.is_empty() {
            break;
        }
        debug!(page, count = blocks.len(), "applying chain page");
        for block in &blocks {
            if ledger.process_block(block)? {
                report.blocks_applied += 1;
            } else {
                report.blocks_rejected += 1;
            }
        }
        page += 1;
    }
    if report.blocks_rejected > 0 {
        warn!(rejected = report.blocks_rejected, "some donor blocks were not applied");
    }
    Ok(())
}
