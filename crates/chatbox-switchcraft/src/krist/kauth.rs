//! kauth: wallet authentication by round trip.
//!
//! A player proves they control an address by sending any amount with
//! `kauth` in the metadata. The job refunds it with `kauth_for=<id>` so the
//! requesting service can match the refund to the original transaction.
//!
//! Only `kauth` requests are refunded. Anything else sent to the wallet,
//! such as `donate=true` transfers, is kept; with a sweep address set, the
//! kept balance is forwarded there after each pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use chatbox_core::{ConnectionHandle, Job};

use crate::error::SwitchcraftResult;
use crate::krist::api::{KristApi, Transaction};
use crate::krist::meta::{CommonMeta, KristName};

/// Marks an incoming authentication request.
pub const KAUTH_KEY: &str = "kauth";
/// Marks an outgoing refund; the value is the request id.
pub const KAUTH_FOR_KEY: &str = "kauth_for";

/// Where a refund goes and the message it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub target: String,
    pub message: String,
    /// `false` when a `return=` name was refused and the sender gets the
    /// refund instead.
    pub verified: bool,
}

/// Decides the refund target for a request sent from `sender`.
///
/// A `return=` name is honoured only if it is in `trusted` and `trusted`
/// maps it to `sender`; otherwise the refund goes back to `sender` with a
/// security message.
pub fn refund_target(sender: &str, meta: &CommonMeta, trusted: &HashMap<String, String>) -> Refund {
    let refused = |message: String| Refund {
        target: sender.to_string(),
        message,
        verified: false,
    };

    let Some((name, _)) = meta.get("return").and_then(KristName::parse_prefix) else {
        return Refund {
            target: sender.to_string(),
            message: "kauth: successful".to_string(),
            verified: true,
        };
    };

    match trusted.get(&name.name) {
        None => refused(format!(
            "Security error: The authentication server doesn't trust the name {}.kst; \
             try directly from an address?",
            name.name
        )),
        Some(owner) if owner != sender => refused(format!(
            "Security error: The authentication server's records for {}.kst don't match \
             yours. Try again with a different address.",
            name.name
        )),
        Some(_) => Refund {
            target: name.to_string(),
            message: "kauth: successful".to_string(),
            verified: true,
        },
    }
}

/// Requests and refunds found in one transaction listing.
#[derive(Debug, Default)]
struct Ledger<'a> {
    requests: BTreeMap<u64, &'a Transaction>,
    refunded: BTreeSet<u64>,
}

impl<'a> Ledger<'a> {
    /// Scans transactions with `id >= since`.
    fn scan(address: &str, transactions: &'a [Transaction], since: u64) -> Self {
        let mut ledger = Self::default();
        for txn in transactions.iter().filter(|t| t.id >= since) {
            let outgoing = txn.from.as_deref() == Some(address);
            let incoming = !outgoing && txn.to.as_deref() == Some(address);
            if !outgoing && !incoming {
                warn!(id = txn.id, "Transaction touches neither side of our address, skipping");
                continue;
            }

            let meta = CommonMeta::parse(txn.metadata.as_deref());
            if incoming && meta.contains(KAUTH_KEY) {
                debug!(id = txn.id, value = txn.value, from = ?txn.from, "kauth request");
                ledger.requests.insert(txn.id, txn);
            }
            if outgoing && let Some(reference) = meta.get(KAUTH_FOR_KEY) {
                match reference.parse::<u64>() {
                    Ok(id) => {
                        ledger.refunded.insert(id);
                    }
                    Err(_) => warn!(id = txn.id, reference, "Invalid kauth_for metadata"),
                }
            }
        }
        ledger
    }

    /// Requests without a refund, ascending.
    fn pending(&self) -> impl Iterator<Item = &'a Transaction> + '_ {
        self.requests
            .iter()
            .filter(|(id, _)| !self.refunded.contains(id))
            .map(|(_, txn)| *txn)
    }

    /// Highest request id that has been refunded.
    fn highest_done(&self) -> Option<u64> {
        self.requests
            .keys()
            .rev()
            .find(|id| self.refunded.contains(id))
            .copied()
    }
}

#[derive(Debug, Default)]
struct KauthState {
    address: Option<String>,
    last_done: u64,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub refunded: usize,
    pub failed: usize,
    /// Amount forwarded to the sweep address.
    pub swept: u64,
}

/// The periodic refund job.
pub struct KauthJob {
    api: Arc<dyn KristApi>,
    trusted: HashMap<String, String>,
    sweep_to: Option<String>,
    state: Mutex<KauthState>,
}

impl KauthJob {
    /// A job refunding through `api`, honouring `return=` names in `trusted`.
    pub fn new(api: Arc<dyn KristApi>, trusted: HashMap<String, String>) -> Self {
        Self {
            api,
            trusted,
            sweep_to: None,
            state: Mutex::new(KauthState::default()),
        }
    }

    /// Forwards the kept balance to `address` after each pass.
    pub fn with_sweep(mut self, address: impl Into<String>) -> Self {
        self.sweep_to = Some(address.into());
        self
    }

    /// Lowest transaction id still scanned.
    pub fn watermark(&self) -> u64 {
        self.state.lock().last_done
    }

    /// Resolves the wallet address once, fast-forwarding the watermark past
    /// requests that were already refunded.
    async fn address(&self) -> SwitchcraftResult<String> {
        let cached = self.state.lock().address.clone();
        if let Some(address) = cached {
            return Ok(address);
        }

        let address = self.api.address().await?;
        let transactions = self.api.recent_transactions(&address).await?;
        let highest = Ledger::scan(&address, &transactions, 0).highest_done();

        let mut state = self.state.lock();
        state.last_done = state.last_done.max(highest.unwrap_or(0));
        state.address = Some(address.clone());
        info!(address = %address, watermark = state.last_done, "kauth ready");
        Ok(address)
    }

    /// Refunds every pending request once, then sweeps the rest of the
    /// balance if a sweep address is set.
    pub async fn reconcile(&self) -> SwitchcraftResult<Reconciliation> {
        let address = self.address().await?;
        // Read before the listing, so every request it covers is listed.
        let balance = match self.sweep_to {
            Some(_) => Some(self.api.balance(&address).await?),
            None => None,
        };
        let transactions = self.api.recent_transactions(&address).await?;
        let since = self.state.lock().last_done;
        let ledger = Ledger::scan(&address, &transactions, since);

        let mut outcome = Reconciliation::default();
        let mut reserved = 0u64;
        for txn in ledger.pending() {
            reserved = reserved.saturating_add(txn.value);
            let Some(sender) = txn.from.as_deref() else {
                warn!(id = txn.id, "kauth request has no sender, skipping");
                continue;
            };
            let meta = CommonMeta::parse(txn.metadata.as_deref());
            let refund = refund_target(sender, &meta, &self.trusted);
            let metadata = format!("message={};{KAUTH_FOR_KEY}={}", refund.message, txn.id);

            match self.api.send(&refund.target, txn.value, &metadata).await {
                Ok(()) => {
                    info!(
                        id = txn.id,
                        value = txn.value,
                        target = %refund.target,
                        verified = refund.verified,
                        "kauth refunded"
                    );
                    outcome.refunded += 1;
                }
                Err(e) => {
                    warn!(id = txn.id, target = %refund.target, error = %e, "kauth refund failed");
                    outcome.failed += 1;
                }
            }
        }

        if let Some(highest) = ledger.highest_done() {
            let mut state = self.state.lock();
            state.last_done = state.last_done.max(highest);
        }

        if let (Some(target), Some(balance)) = (&self.sweep_to, balance) {
            outcome.swept = self.sweep(target, balance.saturating_sub(reserved)).await;
        }
        Ok(outcome)
    }

    async fn sweep(&self, target: &str, amount: u64) -> u64 {
        if amount == 0 {
            return 0;
        }
        match self.api.send(target, amount, "").await {
            Ok(()) => {
                info!(amount, to = target, "Swept kept balance");
                amount
            }
            Err(e) => {
                warn!(amount, to = target, error = %e, "Sweep failed");
                0
            }
        }
    }
}

impl std::fmt::Debug for KauthJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KauthJob")
            .field("trusted", &self.trusted)
            .field("sweep_to", &self.sweep_to)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Job for KauthJob {
    async fn run(&self, _conn: ConnectionHandle) -> anyhow::Result<()> {
        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "kauth pass failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SwitchcraftError;

    const BOT: &str = "kbotaddrxx";

    /// In-memory ledger; sends append outgoing transactions.
    #[derive(Default)]
    struct FakeKrist {
        transactions: Mutex<Vec<Transaction>>,
        sent: Mutex<Vec<(String, u64, String)>>,
        offline: Mutex<bool>,
        balance: Mutex<u64>,
    }

    impl FakeKrist {
        fn with(transactions: Vec<Transaction>) -> Arc<Self> {
            Arc::new(Self {
                transactions: Mutex::new(transactions),
                ..Self::default()
            })
        }

        fn push(&self, txn: Transaction) {
            self.transactions.lock().push(txn);
        }
    }

    #[async_trait]
    impl KristApi for FakeKrist {
        async fn address(&self) -> SwitchcraftResult<String> {
            if *self.offline.lock() {
                return Err(SwitchcraftError::unexpected("krist", "offline"));
            }
            Ok(BOT.to_string())
        }

        async fn recent_transactions(&self, _address: &str) -> SwitchcraftResult<Vec<Transaction>> {
            let mut txns = self.transactions.lock().clone();
            txns.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(txns)
        }

        async fn balance(&self, _address: &str) -> SwitchcraftResult<u64> {
            Ok(*self.balance.lock())
        }

        async fn send(&self, to: &str, amount: u64, metadata: &str) -> SwitchcraftResult<()> {
            self.sent
                .lock()
                .push((to.to_string(), amount, metadata.to_string()));
            let mut balance = self.balance.lock();
            *balance = balance.saturating_sub(amount);
            drop(balance);
            let mut txns = self.transactions.lock();
            let id = txns.iter().map(|t| t.id).max().unwrap_or(0) + 1;
            txns.push(outgoing(id, to, amount, metadata));
            Ok(())
        }
    }

    fn incoming(id: u64, from: &str, value: u64, metadata: &str) -> Transaction {
        Transaction {
            id,
            from: Some(from.into()),
            to: Some(BOT.into()),
            value,
            metadata: Some(metadata.into()),
        }
    }

    fn outgoing(id: u64, to: &str, value: u64, metadata: &str) -> Transaction {
        Transaction {
            id,
            from: Some(BOT.into()),
            to: Some(to.into()),
            value,
            metadata: Some(metadata.into()),
        }
    }

    fn trusted() -> HashMap<String, String> {
        HashMap::from([("switchcraft".to_string(), "kqxhx5yn9v".to_string())])
    }

    #[test]
    fn test_refund_target_rules() {
        let plain = refund_target("kalice", &CommonMeta::parse(Some("kauth=1")), &trusted());
        assert_eq!(plain.target, "kalice");
        assert_eq!(plain.message, "kauth: successful");
        assert!(plain.verified);

        let named = refund_target(
            "kqxhx5yn9v",
            &CommonMeta::parse(Some("kauth=1;return=alice@switchcraft.kst")),
            &trusted(),
        );
        assert_eq!(named.target, "alice@switchcraft.kst");
        assert!(named.verified);

        let untrusted = refund_target(
            "kalice",
            &CommonMeta::parse(Some("kauth=1;return=bob@evil.kst")),
            &trusted(),
        );
        assert_eq!(untrusted.target, "kalice");
        assert!(!untrusted.verified);
        assert_eq!(
            untrusted.message,
            "Security error: The authentication server doesn't trust the name evil.kst; \
             try directly from an address?"
        );

        let mismatch = refund_target(
            "kmallory",
            &CommonMeta::parse(Some("kauth=1;return=alice@switchcraft.kst")),
            &trusted(),
        );
        assert_eq!(mismatch.target, "kmallory");
        assert!(mismatch.message.contains("records for switchcraft.kst don't match"));
    }

    #[tokio::test]
    async fn test_first_pass_fast_forwards_and_refunds_pending() {
        let krist = FakeKrist::with(vec![
            incoming(8, "kbob", 2, "kauth=1"),
            outgoing(9, "kbob", 2, "message=kauth: successful;kauth_for=8"),
            incoming(10, "kalice", 1, "kauth=1"),
            incoming(11, "kcarol", 5, "just a tip"),
        ]);
        let job = KauthJob::new(krist.clone(), trusted());

        let outcome = job.reconcile().await.unwrap();

        assert_eq!(
            outcome,
            Reconciliation {
                refunded: 1,
                failed: 0,
                swept: 0
            }
        );
        assert_eq!(
            *krist.sent.lock(),
            vec![(
                "kalice".to_string(),
                1,
                "message=kauth: successful;kauth_for=10".to_string()
            )]
        );
        assert_eq!(job.watermark(), 8);

        // The refund shows up in the next listing and moves the watermark.
        let outcome = job.reconcile().await.unwrap();
        assert_eq!(outcome.refunded, 0);
        assert_eq!(krist.sent.lock().len(), 1);
        assert_eq!(job.watermark(), 10);
    }

    #[tokio::test]
    async fn test_requests_below_watermark_are_ignored() {
        let krist = FakeKrist::with(vec![
            incoming(3, "kold", 1, "kauth=1"),
            incoming(5, "kbob", 2, "kauth=1"),
            outgoing(6, "kbob", 2, "kauth_for=5"),
        ]);
        let job = KauthJob::new(krist.clone(), trusted());

        job.reconcile().await.unwrap();

        assert_eq!(job.watermark(), 5);
        assert!(krist.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_transactions_are_skipped() {
        let krist = FakeKrist::with(vec![
            Transaction {
                id: 1,
                from: Some("kx".into()),
                to: Some("ky".into()),
                value: 1,
                metadata: Some("kauth=1".into()),
            },
            outgoing(2, "kz", 1, "kauth_for=abc"),
            incoming(3, "kdave", 4, "shop@switchcraft.kst;kauth=1;return=dave@switchcraft.kst"),
        ]);
        let job = KauthJob::new(krist.clone(), trusted());

        job.run(ConnectionHandle::channel().0).await.unwrap();

        let sent = krist.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "kdave");
        assert!(sent[0].2.starts_with("message=Security error"));
        assert!(sent[0].2.ends_with(";kauth_for=3"));
    }

    #[tokio::test]
    async fn test_kept_balance_is_swept() {
        let krist = FakeKrist::with(vec![
            incoming(1, "kalice", 3, "kauth=1"),
            incoming(2, "kbob", 10, "donate=true"),
            incoming(3, "kcarol", 4, "thanks"),
        ]);
        *krist.balance.lock() = 17;
        let job = KauthJob::new(krist.clone(), trusted()).with_sweep("kpk8qmvoy7");

        let outcome = job.reconcile().await.unwrap();

        assert_eq!(outcome.refunded, 1);
        assert_eq!(outcome.swept, 14);
        let sent = krist.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].0.as_str(), sent[0].1), ("kalice", 3));
        assert_eq!(sent[1], ("kpk8qmvoy7".to_string(), 14, String::new()));
        assert_eq!(*krist.balance.lock(), 0);

        // Nothing left to forward.
        assert_eq!(job.reconcile().await.unwrap().swept, 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_value_of_failed_refunds() {
        struct Refusing(Arc<FakeKrist>);

        #[async_trait]
        impl KristApi for Refusing {
            async fn address(&self) -> SwitchcraftResult<String> {
                self.0.address().await
            }

            async fn recent_transactions(
                &self,
                address: &str,
            ) -> SwitchcraftResult<Vec<Transaction>> {
                self.0.recent_transactions(address).await
            }

            async fn balance(&self, address: &str) -> SwitchcraftResult<u64> {
                self.0.balance(address).await
            }

            async fn send(&self, to: &str, amount: u64, metadata: &str) -> SwitchcraftResult<()> {
                if metadata.contains(KAUTH_FOR_KEY) {
                    return Err(SwitchcraftError::Krist {
                        code: "name_not_found".into(),
                        message: "Name not found".into(),
                    });
                }
                self.0.send(to, amount, metadata).await
            }
        }

        let krist = FakeKrist::with(vec![
            incoming(1, "kalice", 3, "kauth=1"),
            incoming(2, "kbob", 10, "donate=true"),
        ]);
        *krist.balance.lock() = 13;
        let job = KauthJob::new(Arc::new(Refusing(krist.clone())), trusted()).with_sweep("ksink");

        let outcome = job.reconcile().await.unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.swept, 10);
        assert_eq!(*krist.balance.lock(), 3);
    }

    #[tokio::test]
    async fn test_job_contains_api_failures() {
        let krist = FakeKrist::with(vec![incoming(1, "kalice", 1, "kauth=1")]);
        *krist.offline.lock() = true;
        let job = KauthJob::new(krist.clone(), trusted());

        assert!(job.run(ConnectionHandle::channel().0).await.is_ok());
        assert!(krist.sent.lock().is_empty());

        *krist.offline.lock() = false;
        job.run(ConnectionHandle::channel().0).await.unwrap();
        assert_eq!(krist.sent.lock().len(), 1);
    }
}
