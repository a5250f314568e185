//! The in-process facilitator: the concrete `verify`/`settle`/`supported` pipeline.
//!
//! [`FacilitatorLocal`] implements [`stellar_x402_types::facilitator::Facilitator`]
//! directly against a [`LedgerAdapter`] and a [`ReplayStore`], without going through
//! HTTP. It is what the `facilitator` binary wraps in a router, and what tests
//! exercise directly with fake adapters.
//!
//! Verification is a pure function of the payload, the requirements, and one ledger
//! read (the source account, to confirm it exists and the asset it claims to hold).
//! It never mutates ledger or replay-store state. Settlement repeats every check
//! verify performs — a caller must never be able to settle a payload it never
//! verified — then submits to the ledger, guarded by the replay store's claim/release
//! discipline so that two concurrent settle calls for the same transaction hash
//! produce exactly one ledger submission.

use crate::ledger::{LedgerAdapter, LedgerAdapterError, PaymentOperation, SubmitOutcome};
use crate::replay_store::{ReplayStore, SettlementRecord};
use std::str::FromStr;
use stellar_x402_types::facilitator::Facilitator;
use stellar_x402_types::ledger_sequence::LedgerSequence;
use stellar_x402_types::proto::{
    Asset, InvalidReason, Scheme, SettleRequest, SettleResult, SupportedKind, SupportedResponse,
    VerifyRequest, VerifyResult,
};

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    #[error("ledger adapter error: {0}")]
    Ledger(#[from] LedgerAdapterError),
    #[error("replay store error: {0}")]
    ReplayStore(#[from] crate::replay_store::ReplayStoreError),
}

/// A single invalid-reason short-circuit, carrying the payer address when known so
/// the caller can still report who attempted the payment on rejection.
struct Rejection {
    reason: InvalidReason,
    payer: Option<String>,
}

impl Rejection {
    fn new(reason: InvalidReason, payer: Option<String>) -> Self {
        Self { reason, payer }
    }
}

/// The in-process `exact` scheme facilitator for Stellar-family ledgers.
pub struct FacilitatorLocal<L, R> {
    ledger: L,
    replay_store: R,
}

impl<L, R> FacilitatorLocal<L, R>
where
    L: LedgerAdapter,
    R: ReplayStore,
{
    pub fn new(ledger: L, replay_store: R) -> Self {
        Self {
            ledger,
            replay_store,
        }
    }

    /// Runs every stateless check shared by verify and settle: scheme, network,
    /// structural decode, expiry, and exact match against the requirements'
    /// amount/destination/asset, followed by a balance check against the ledger.
    ///
    /// Returns the payload's source account on success, or a [`Rejection`] carrying
    /// the first failing check.
    async fn assert_payload_matches_requirements(
        &self,
        request: &VerifyRequest,
    ) -> Result<String, Rejection> {
        let payload = &request.payment_payload;
        let requirements = &request.payment_requirements;

        if payload.scheme != requirements.scheme {
            return Err(Rejection::new(InvalidReason::InvalidScheme, None));
        }
        if payload.scheme != Scheme::Exact {
            return Err(Rejection::new(InvalidReason::UnsupportedScheme, None));
        }
        if payload.network != requirements.network || payload.network != self.ledger.network() {
            return Err(Rejection::new(InvalidReason::InvalidNetwork, None));
        }

        let payer = payload.source_account.clone();

        if payload.signed_tx_xdr.is_empty() {
            return Err(Rejection::new(
                InvalidReason::ExactStellarPayloadMissingSignedTx,
                Some(payer),
            ));
        }

        let required_amount = match requirements.max_amount_required.parse::<i128>() {
            Ok(amount) => amount,
            Err(_) => {
                return Err(Rejection::new(
                    InvalidReason::InvalidPaymentRequirements,
                    Some(payer),
                ));
            }
        };
        let payload_amount = match payload.amount.parse::<i128>() {
            Ok(amount) => amount,
            Err(_) => return Err(Rejection::new(InvalidReason::InvalidPayload, Some(payer))),
        };
        if payload_amount < required_amount {
            return Err(Rejection::new(
                InvalidReason::ExactStellarPayloadAmountMismatch,
                Some(payer),
            ));
        }
        if payload.destination != requirements.pay_to {
            return Err(Rejection::new(
                InvalidReason::ExactStellarPayloadDestinationMismatch,
                Some(payer),
            ));
        }
        if payload.asset != requirements.asset {
            return Err(Rejection::new(
                InvalidReason::ExactStellarPayloadAssetMismatch,
                Some(payer),
            ));
        }

        let valid_until = match LedgerSequence::from_str(&payload.valid_until_ledger) {
            Ok(ledger) => ledger,
            Err(_) => {
                return Err(Rejection::new(
                    InvalidReason::ExactStellarPayloadMissingRequiredFields,
                    Some(payer),
                ));
            }
        };
        let current_ledger = self
            .ledger
            .current_ledger_sequence()
            .await
            .map_err(|err| map_ledger_rejection(err, Some(payer.clone())))?;
        if valid_until.as_u32() <= current_ledger {
            return Err(Rejection::new(
                InvalidReason::ExactStellarPayloadTransactionExpired,
                Some(payer),
            ));
        }

        let parsed = self
            .ledger
            .parse_transaction(&payload.signed_tx_xdr)
            .await
            .map_err(|err| map_ledger_rejection(err, Some(payer.clone())))?;

        if parsed.source_account != payload.source_account {
            return Err(Rejection::new(
                InvalidReason::ExactStellarPayloadSourceAccountNotFound,
                Some(payer),
            ));
        }
        if parsed.network_passphrase != self.ledger.network().info().passphrase {
            return Err(Rejection::new(InvalidReason::InvalidNetwork, Some(payer)));
        }

        match (&parsed.operation, &payload.asset) {
            (PaymentOperation::Native { destination, amount }, Asset::Native) => {
                if *destination != payload.destination || *amount != payload_amount {
                    return Err(Rejection::new(
                        InvalidReason::ExactStellarPayloadAmountMismatch,
                        Some(payer),
                    ));
                }
            }
            (
                PaymentOperation::Contract {
                    contract_id,
                    to,
                    amount,
                    ..
                },
                Asset::Contract(expected_contract),
            ) => {
                if contract_id != expected_contract
                    || *to != payload.destination
                    || *amount != payload_amount
                {
                    return Err(Rejection::new(
                        InvalidReason::ExactStellarPayloadAmountMismatch,
                        Some(payer),
                    ));
                }
            }
            _ => {
                return Err(Rejection::new(
                    InvalidReason::ExactStellarPayloadAssetMismatch,
                    Some(payer),
                ));
            }
        }

        let account = self
            .ledger
            .load_account(&payload.source_account)
            .await
            .map_err(|err| map_ledger_rejection(err, Some(payer.clone())))?;
        let available = match &payload.asset {
            Asset::Native => account.native_balance,
            Asset::Contract(id) => account
                .trust_lines
                .get(id)
                .map(|line| line.balance)
                .unwrap_or(0),
        };
        if available < payload_amount {
            return Err(Rejection::new(
                InvalidReason::InsufficientFunds,
                Some(payer),
            ));
        }

        Ok(payer)
    }
}

fn map_ledger_rejection(err: LedgerAdapterError, payer: Option<String>) -> Rejection {
    let reason = match err {
        LedgerAdapterError::AccountNotFound(_) => {
            InvalidReason::ExactStellarPayloadSourceAccountNotFound
        }
        LedgerAdapterError::InvalidXdr(_) => InvalidReason::ExactStellarPayloadInvalidXdr,
        LedgerAdapterError::WrongOperationCount(_) => {
            InvalidReason::ExactStellarPayloadMissingRequiredFields
        }
        LedgerAdapterError::Transport(_) => InvalidReason::UnexpectedVerifyError,
        LedgerAdapterError::SubmissionRejected(_) => {
            InvalidReason::ExactStellarSettlementTransactionFailed
        }
    };
    Rejection::new(reason, payer)
}

impl<L, R> Facilitator for FacilitatorLocal<L, R>
where
    L: LedgerAdapter,
    R: ReplayStore,
{
    type Error = FacilitatorLocalError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResult, Self::Error> {
        let payer = match self.assert_payload_matches_requirements(request).await {
            Ok(payer) => payer,
            Err(rejection) => {
                return Ok(VerifyResult::invalid(rejection.reason, rejection.payer));
            }
        };

        // A payload that passed every structural/cross-check can still name a
        // transaction hash already settled; `assert_payload_matches_requirements`
        // is also re-run by `settle` as part of its own claim/settle dance, where
        // this same check would misfire against a claim this call itself holds, so
        // it lives here rather than in the shared helper.
        let parsed = self
            .ledger
            .parse_transaction(&request.payment_payload.signed_tx_xdr)
            .await?;
        if self.replay_store.get(&parsed.hash).await?.is_some() {
            return Ok(VerifyResult::invalid(
                InvalidReason::ExactStellarPayloadTransactionAlreadyUsed,
                Some(payer),
            ));
        }

        Ok(VerifyResult::valid(payer))
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResult, Self::Error> {
        let network = request.payment_payload.network;
        let payer = match self.assert_payload_matches_requirements(request).await {
            Ok(payer) => payer,
            Err(rejection) => {
                return Ok(SettleResult::failure(
                    rejection.reason,
                    rejection.payer.unwrap_or_default(),
                    network,
                ));
            }
        };

        let parsed = self
            .ledger
            .parse_transaction(&request.payment_payload.signed_tx_xdr)
            .await?;

        let claimed = self.replay_store.mark_pending(&parsed.hash).await?;
        if !claimed {
            if let Some(existing) = self.replay_store.get(&parsed.hash).await? {
                return Ok(if existing.success {
                    SettleResult::success(payer, parsed.hash, network)
                } else {
                    SettleResult::failure(
                        InvalidReason::ExactStellarSettlementTransactionFailed,
                        payer,
                        network,
                    )
                });
            }
            return Ok(SettleResult::failure(
                InvalidReason::ExactStellarPayloadTransactionAlreadyUsed,
                payer,
                network,
            ));
        }

        let outcome = match &parsed.operation {
            PaymentOperation::Native { .. } => {
                self.ledger
                    .submit_transaction(&request.payment_payload.signed_tx_xdr)
                    .await
            }
            PaymentOperation::Contract { .. } => {
                self.ledger
                    .submit_contract_invocation(
                        &request.payment_payload.signed_tx_xdr,
                        std::time::Duration::from_secs(
                            u64::from(request.payment_requirements.max_timeout_seconds).max(1),
                        ),
                    )
                    .await
            }
        };

        match outcome {
            Ok(SubmitOutcome::Accepted { hash }) => {
                self.replay_store
                    .mark_settled(
                        &parsed.hash,
                        SettlementRecord {
                            success: true,
                            payer: payer.clone(),
                            network,
                        },
                    )
                    .await?;
                Ok(SettleResult::success(payer, hash, network))
            }
            Ok(SubmitOutcome::Rejected { .. }) | Ok(SubmitOutcome::TimedOut) => {
                self.replay_store
                    .mark_settled(
                        &parsed.hash,
                        SettlementRecord {
                            success: false,
                            payer: payer.clone(),
                            network,
                        },
                    )
                    .await?;
                Ok(SettleResult::failure(
                    InvalidReason::ExactStellarSettlementTransactionFailed,
                    payer,
                    network,
                ))
            }
            Err(err) => {
                self.replay_store.release_pending(&parsed.hash).await?;
                Err(FacilitatorLocalError::Ledger(err))
            }
        }
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        Ok(SupportedResponse {
            kinds: vec![SupportedKind {
                scheme: Scheme::Exact,
                network: self.ledger.network(),
                extra: None,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerAccount, ParsedTransaction};
    use crate::replay_store::InMemoryReplayStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use stellar_x402_types::network::Network;
    use stellar_x402_types::proto::{PaymentPayload, PaymentRequirements, X402Version1};

    struct FakeLedger {
        network: Network,
        current_ledger: u32,
        accounts: HashMap<String, LedgerAccount>,
        submissions: Mutex<Vec<String>>,
    }

    impl LedgerAdapter for FakeLedger {
        fn network(&self) -> Network {
            self.network
        }

        async fn current_ledger_sequence(&self) -> Result<u32, LedgerAdapterError> {
            Ok(self.current_ledger)
        }

        async fn load_account(
            &self,
            account_id: &str,
        ) -> Result<LedgerAccount, LedgerAdapterError> {
            self.accounts
                .get(account_id)
                .cloned()
                .ok_or_else(|| LedgerAdapterError::AccountNotFound(account_id.to_string()))
        }

        async fn parse_transaction(
            &self,
            signed_tx_xdr: &str,
        ) -> Result<ParsedTransaction, LedgerAdapterError> {
            Ok(ParsedTransaction {
                source_account: "GSOURCE".to_string(),
                network_passphrase: self.network.info().passphrase.to_string(),
                time_bounds: None,
                operation: PaymentOperation::Native {
                    destination: "GDEST".to_string(),
                    amount: 10_000_000,
                },
                hash: format!("hash-of-{signed_tx_xdr}"),
            })
        }

        async fn submit_transaction(
            &self,
            signed_tx_xdr: &str,
        ) -> Result<SubmitOutcome, LedgerAdapterError> {
            self.submissions.lock().unwrap().push(signed_tx_xdr.to_string());
            Ok(SubmitOutcome::Accepted {
                hash: format!("hash-of-{signed_tx_xdr}"),
            })
        }

        async fn submit_fee_bump(
            &self,
            signed_tx_xdr: &str,
            _fee_source_secret: &str,
        ) -> Result<SubmitOutcome, LedgerAdapterError> {
            self.submit_transaction(signed_tx_xdr).await
        }

        async fn submit_contract_invocation(
            &self,
            signed_tx_xdr: &str,
            _timeout: std::time::Duration,
        ) -> Result<SubmitOutcome, LedgerAdapterError> {
            self.submit_transaction(signed_tx_xdr).await
        }
    }

    fn fake_ledger() -> FakeLedger {
        let mut accounts = HashMap::new();
        accounts.insert(
            "GSOURCE".to_string(),
            LedgerAccount {
                account_id: "GSOURCE".to_string(),
                sequence: 1,
                native_balance: 50_000_000,
                trust_lines: HashMap::new(),
            },
        );
        FakeLedger {
            network: Network::StellarTestnet,
            current_ledger: 100,
            accounts,
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn sample_request() -> VerifyRequest {
        VerifyRequest {
            x402_version: X402Version1,
            payment_payload: PaymentPayload {
                x402_version: X402Version1,
                scheme: Scheme::Exact,
                network: Network::StellarTestnet,
                signed_tx_xdr: "AAAAAgAAAAA=".to_string(),
                source_account: "GSOURCE".to_string(),
                amount: "10000000".to_string(),
                destination: "GDEST".to_string(),
                asset: Asset::Native,
                valid_until_ledger: "200".to_string(),
                nonce: "11111111-1111-1111-1111-111111111111".to_string(),
            },
            payment_requirements: PaymentRequirements {
                scheme: Scheme::Exact,
                network: Network::StellarTestnet,
                max_amount_required: "10000000".to_string(),
                resource: "https://example.com/premium".to_string(),
                description: "premium content".to_string(),
                mime_type: "application/json".to_string(),
                pay_to: "GDEST".to_string(),
                max_timeout_seconds: 300,
                asset: Asset::Native,
                extra: None,
            },
        }
    }

    #[tokio::test]
    async fn verify_accepts_a_matching_payload() {
        let facilitator = FacilitatorLocal::new(fake_ledger(), InMemoryReplayStore::new());
        let result = facilitator.verify(&sample_request()).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.payer.as_deref(), Some("GSOURCE"));
    }

    #[tokio::test]
    async fn verify_rejects_insufficient_amount() {
        let mut request = sample_request();
        request.payment_payload.amount = "1".to_string();
        request.payment_requirements.max_amount_required = "10000000".to_string();
        let facilitator = FacilitatorLocal::new(fake_ledger(), InMemoryReplayStore::new());
        let result = facilitator.verify(&request).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(
            result.invalid_reason,
            Some(InvalidReason::ExactStellarPayloadAmountMismatch)
        );
    }

    #[tokio::test]
    async fn verify_rejects_expired_payload() {
        let mut request = sample_request();
        request.payment_payload.valid_until_ledger = "50".to_string();
        let facilitator = FacilitatorLocal::new(fake_ledger(), InMemoryReplayStore::new());
        let result = facilitator.verify(&request).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(
            result.invalid_reason,
            Some(InvalidReason::ExactStellarPayloadTransactionExpired)
        );
    }

    #[tokio::test]
    async fn settle_is_idempotent_on_transaction_hash() {
        let facilitator = FacilitatorLocal::new(fake_ledger(), InMemoryReplayStore::new());
        let request = sample_request();
        let first = facilitator.settle(&request).await.unwrap();
        assert!(first.success);
        let second = facilitator.settle(&request).await.unwrap();
        assert!(second.success);
        assert_eq!(first.transaction, second.transaction);
    }

    #[tokio::test]
    async fn verify_after_settle_rejects_as_already_used() {
        let facilitator = FacilitatorLocal::new(fake_ledger(), InMemoryReplayStore::new());
        let request = sample_request();
        let settled = facilitator.settle(&request).await.unwrap();
        assert!(settled.success);

        let result = facilitator.verify(&request).await.unwrap();
        assert!(!result.is_valid);
        assert_eq!(
            result.invalid_reason,
            Some(InvalidReason::ExactStellarPayloadTransactionAlreadyUsed)
        );
    }

    #[tokio::test]
    async fn supported_reports_exact_scheme_on_configured_network() {
        let facilitator = FacilitatorLocal::new(fake_ledger(), InMemoryReplayStore::new());
        let supported = facilitator.supported().await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.kinds[0].scheme, Scheme::Exact);
        assert_eq!(supported.kinds[0].network, Network::StellarTestnet);
    }
}
