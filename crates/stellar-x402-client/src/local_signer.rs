//! [`LocalKeySigner`]: a [`PaymentSigner`] backed by a raw ed25519 secret key held in
//! process memory. Builds the transfer transaction from scratch (fetching the paying
//! account's current sequence number from Horizon), then signs it offline.
//!
//! This is the "hot wallet" signer: convenient for server-to-server agents and test
//! harnesses, unsuitable for anything a human should approve per-payment. An
//! interactive-wallet [`PaymentSigner`] belongs in its own crate and is not provided
//! here.

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    DecoratedSignature, Hash, HostFunction, InvokeContractArgs, InvokeHostFunctionOp, LedgerBounds,
    Limits, Memo, MuxedAccount, Operation, OperationBody, PaymentOp, Preconditions,
    PreconditionsV2, ReadXdr, ScAddress, ScSymbol, ScVal, SequenceNumber, Signature,
    SignatureHint, SorobanAuthorizationEntry, SorobanTransactionData, StringM, Transaction,
    TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV1Envelope, Uint256, VecM, WriteXdr,
};

use stellar_x402_types::network::Network;
use stellar_x402_types::proto::{Asset, PaymentRequirements};
use stellar_x402_types::util::Base64Bytes;

use crate::signer::{PaymentSigner, SignedPayment, SignerError};

/// Roughly how often a ledger closes; used to turn a timeout in seconds into a ledger
/// count for the transaction's ledger-bounds expiry.
const LEDGER_CLOSE_TIME_SECONDS: u32 = 5;

pub struct LocalKeySigner {
    source_account: String,
    signing_key: SigningKey,
    network: Network,
    http: reqwest::Client,
}

impl LocalKeySigner {
    /// `secret_seed` is the raw 32-byte ed25519 seed (not the `S...` strkey string;
    /// callers decode that upfront so this type has no strkey dependency of its own).
    pub fn new(source_account: String, secret_seed: [u8; 32], network: Network) -> Self {
        Self {
            source_account,
            signing_key: SigningKey::from_bytes(&secret_seed),
            network,
            http: reqwest::Client::new(),
        }
    }

    async fn next_sequence_number(&self) -> Result<i64, SignerError> {
        let horizon_url = self.network.info().horizon_url;
        let url = format!("{}/accounts/{}", horizon_url.trim_end_matches('/'), self.source_account);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?;
        let current: i64 = body
            .get("sequence")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SignerError::Build("missing sequence in account response".to_string()))?
            .parse()
            .map_err(|_| SignerError::Build("non-numeric sequence in account response".to_string()))?;
        Ok(current + 1)
    }

    async fn current_ledger_sequence(&self) -> Result<u32, SignerError> {
        let horizon_url = self.network.info().horizon_url;
        let url = format!("{}/ledgers?order=desc&limit=1", horizon_url.trim_end_matches('/'));
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?;
        body.get("_embedded")
            .and_then(|e| e.get("records"))
            .and_then(|r| r.as_array())
            .and_then(|a| a.first())
            .and_then(|l| l.get("sequence"))
            .and_then(|s| s.as_u64())
            .map(|s| s as u32)
            .ok_or_else(|| SignerError::Build("missing ledger sequence in horizon response".to_string()))
    }

    fn account_id(&self) -> Result<stellar_xdr::curr::AccountId, SignerError> {
        let public = stellar_strkey::ed25519::PublicKey::from_string(&self.source_account)
            .map_err(|e| SignerError::Build(format!("invalid source account: {e}")))?;
        Ok(stellar_xdr::curr::AccountId(
            stellar_xdr::curr::PublicKey::PublicKeyTypeEd25519(Uint256(public.0)),
        ))
    }

    fn build_operation(
        &self,
        requirements: &PaymentRequirements,
        amount: i128,
    ) -> Result<Operation, SignerError> {
        let destination = strkey_muxed_account(&requirements.pay_to)?;
        let body = match &requirements.asset {
            Asset::Native => OperationBody::Payment(PaymentOp {
                destination,
                asset: stellar_xdr::curr::Asset::Native,
                amount,
            }),
            Asset::Contract(contract_id) => {
                let contract = stellar_strkey::Contract::from_string(contract_id)
                    .map_err(|e| SignerError::Build(format!("invalid contract id: {e}")))?;
                let from_sc = ScVal::Address(ScAddress::Account(self.account_id()?));
                let to_sc = ScVal::Address(strkey_sc_address(&requirements.pay_to)?);
                let amount_sc = ScVal::I128(stellar_xdr::curr::Int128Parts {
                    hi: (amount >> 64) as i64,
                    lo: amount as u64,
                });
                let function_name = ScSymbol(
                    StringM::try_from("transfer".as_bytes().to_vec())
                        .map_err(|e| SignerError::Build(e.to_string()))?,
                );
                let args = VecM::try_from(vec![from_sc, to_sc, amount_sc])
                    .map_err(|e| SignerError::Build(e.to_string()))?;
                OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
                    host_function: HostFunction::InvokeContract(InvokeContractArgs {
                        contract_address: ScAddress::Contract(Hash(contract.0)),
                        function_name,
                        args,
                    }),
                    auth: VecM::default(),
                })
            }
        };
        Ok(Operation {
            source_account: None,
            body,
        })
    }

    fn network_id(&self) -> Hash {
        let digest = Sha256::digest(self.network.info().passphrase.as_bytes());
        Hash(digest.into())
    }

    /// Simulates `transaction` against the Soroban RPC endpoint to obtain the
    /// authorization entries and resource footprint a contract invocation needs before
    /// it can be submitted. Only contract-asset payments call this; a plain Payment
    /// operation needs neither.
    async fn simulate_and_apply_auth(
        &self,
        transaction: &Transaction,
        mut operation: Operation,
    ) -> Result<(Operation, TransactionExt), SignerError> {
        let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx: transaction.clone(),
            signatures: VecM::default(),
        });
        let envelope_xdr = envelope
            .to_xdr(Limits::none())
            .map_err(|e| SignerError::Build(e.to_string()))?;
        let envelope_b64 = Base64Bytes::from(envelope_xdr.as_slice()).to_string();

        let rpc_url = self.network.info().soroban_rpc_url;
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "simulateTransaction",
            "params": { "transaction": envelope_b64 },
        });
        let response: SimulateTransactionResponse = self
            .http
            .post(rpc_url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?
            .json()
            .await
            .map_err(|e| SignerError::Build(e.to_string()))?;

        let result = response
            .result
            .ok_or_else(|| SignerError::Build("simulateTransaction returned no result".to_string()))?;
        if let Some(error) = result.error {
            return Err(SignerError::Build(format!(
                "simulateTransaction failed: {error}"
            )));
        }
        let entry = result.results.into_iter().next().ok_or_else(|| {
            SignerError::Build("simulateTransaction returned no results".to_string())
        })?;

        let auth_entries = entry
            .auth
            .iter()
            .map(|b64| decode_xdr::<SorobanAuthorizationEntry>(b64))
            .collect::<Result<Vec<_>, _>>()?;
        let transaction_data = decode_xdr::<SorobanTransactionData>(&result.transaction_data)?;

        if let OperationBody::InvokeHostFunction(ref mut invoke) = operation.body {
            invoke.auth = VecM::try_from(auth_entries).map_err(|e| SignerError::Build(e.to_string()))?;
        }
        Ok((operation, TransactionExt::V1(transaction_data)))
    }
}

fn decode_xdr<T: ReadXdr>(b64: &str) -> Result<T, SignerError> {
    let bytes = Base64Bytes::from(b64.as_bytes())
        .decode()
        .map_err(|e| SignerError::Build(format!("invalid base64 in simulate response: {e}")))?;
    T::from_xdr(bytes, Limits::none())
        .map_err(|e| SignerError::Build(format!("invalid xdr in simulate response: {e}")))
}

#[derive(serde::Deserialize)]
struct SimulateTransactionResponse {
    #[serde(default)]
    result: Option<SimulateTransactionResult>,
}

#[derive(serde::Deserialize)]
struct SimulateTransactionResult {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<SimulateTransactionEntry>,
    #[serde(rename = "transactionData", default)]
    transaction_data: String,
}

#[derive(serde::Deserialize)]
struct SimulateTransactionEntry {
    #[serde(default)]
    auth: Vec<String>,
}

fn strkey_muxed_account(address: &str) -> Result<MuxedAccount, SignerError> {
    let public = stellar_strkey::ed25519::PublicKey::from_string(address)
        .map_err(|e| SignerError::Build(format!("invalid destination account: {e}")))?;
    Ok(MuxedAccount::Ed25519(Uint256(public.0)))
}

fn strkey_sc_address(address: &str) -> Result<ScAddress, SignerError> {
    if let Ok(public) = stellar_strkey::ed25519::PublicKey::from_string(address) {
        return Ok(ScAddress::Account(stellar_xdr::curr::AccountId(
            stellar_xdr::curr::PublicKey::PublicKeyTypeEd25519(Uint256(public.0)),
        )));
    }
    let contract = stellar_strkey::Contract::from_string(address)
        .map_err(|e| SignerError::Build(format!("invalid destination address: {e}")))?;
    Ok(ScAddress::Contract(Hash(contract.0)))
}

#[async_trait]
impl PaymentSigner for LocalKeySigner {
    fn source_account(&self) -> &str {
        &self.source_account
    }

    async fn sign_payment(
        &self,
        requirements: &PaymentRequirements,
        max_timeout_seconds: u32,
    ) -> Result<SignedPayment, SignerError> {
        let amount: i128 = requirements
            .max_amount_required
            .parse()
            .map_err(|_| SignerError::Build("maxAmountRequired is not a valid integer".to_string()))?;
        let operation = self.build_operation(requirements, amount)?;
        let sequence = self.next_sequence_number().await?;
        let current_ledger = self.current_ledger_sequence().await?;
        let ledger_timeout = max_timeout_seconds.div_ceil(LEDGER_CLOSE_TIME_SECONDS.max(1));
        let valid_until_ledger = current_ledger + ledger_timeout.max(1);

        let mut transaction = Transaction {
            source_account: MuxedAccount::Ed25519(Uint256(
                stellar_strkey::ed25519::PublicKey::from_string(&self.source_account)
                    .map_err(|e| SignerError::Build(e.to_string()))?
                    .0,
            )),
            fee: 100,
            seq_num: SequenceNumber(sequence),
            cond: Preconditions::V2(PreconditionsV2 {
                time_bounds: None,
                ledger_bounds: Some(LedgerBounds {
                    min_ledger: 0,
                    max_ledger: valid_until_ledger,
                }),
                min_seq_num: None,
                min_seq_age: stellar_xdr::curr::Duration(0),
                min_seq_ledger_gap: 0,
                extra_signers: VecM::default(),
            }),
            memo: Memo::None,
            operations: VecM::try_from(vec![operation])
                .map_err(|e| SignerError::Build(e.to_string()))?,
            ext: TransactionExt::V0,
        };

        if matches!(requirements.asset, Asset::Contract(_)) {
            let operation = transaction
                .operations
                .first()
                .cloned()
                .ok_or_else(|| SignerError::Build("missing payment operation".to_string()))?;
            let (operation, ext) = self.simulate_and_apply_auth(&transaction, operation).await?;
            transaction.operations = VecM::try_from(vec![operation])
                .map_err(|e| SignerError::Build(e.to_string()))?;
            transaction.ext = ext;
        }

        let payload = TransactionSignaturePayload {
            network_id: self.network_id(),
            tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(transaction.clone()),
        };
        let payload_xdr = payload
            .to_xdr(Limits::none())
            .map_err(|e| SignerError::Sign(e.to_string()))?;
        let hash = Sha256::digest(&payload_xdr);

        let signature = self.signing_key.sign(&hash);
        let hint = {
            let verifying = self.signing_key.verifying_key().to_bytes();
            let mut h = [0u8; 4];
            h.copy_from_slice(&verifying[28..32]);
            h
        };
        let decorated = DecoratedSignature {
            hint: SignatureHint(hint),
            signature: Signature(
                signature
                    .to_bytes()
                    .to_vec()
                    .try_into()
                    .map_err(|_| SignerError::Sign("signature length mismatch".to_string()))?,
            ),
        };

        let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx: transaction,
            signatures: VecM::try_from(vec![decorated])
                .map_err(|e| SignerError::Sign(e.to_string()))?,
        });

        let bytes = envelope
            .to_xdr(Limits::none())
            .map_err(|e| SignerError::Sign(e.to_string()))?;
        Ok(SignedPayment {
            signed_tx_xdr: stellar_x402_types::util::Base64Bytes::encode(bytes).to_string(),
            valid_until_ledger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7";
    const DESTINATION: &str = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";
    const CONTRACT: &str = "CA7QYNF7SOWQ3GLR2BGMZEHXAVIRZA4KVWLTJJFC7MGXUA74P7UJUWDA";

    fn signer() -> LocalKeySigner {
        LocalKeySigner::new(SOURCE.to_string(), [7u8; 32], Network::StellarTestnet)
    }

    fn native_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: stellar_x402_types::proto::Scheme::Exact,
            network: Network::StellarTestnet,
            max_amount_required: "10000000".to_string(),
            resource: "https://example.com/premium".to_string(),
            description: "premium content".to_string(),
            mime_type: "application/json".to_string(),
            pay_to: DESTINATION.to_string(),
            max_timeout_seconds: 60,
            asset: Asset::Native,
            extra: None,
        }
    }

    #[test]
    fn build_operation_native_payment() {
        let signer = signer();
        let requirements = native_requirements();
        let operation = signer.build_operation(&requirements, 10_000_000).unwrap();
        match operation.body {
            OperationBody::Payment(payment) => {
                assert_eq!(payment.amount, 10_000_000);
                assert_eq!(payment.asset, stellar_xdr::curr::Asset::Native);
            }
            _ => panic!("expected a Payment operation"),
        }
    }

    #[test]
    fn build_operation_contract_invokes_transfer() {
        let signer = signer();
        let mut requirements = native_requirements();
        requirements.asset = Asset::Contract(CONTRACT.to_string());
        let operation = signer.build_operation(&requirements, 42).unwrap();
        match operation.body {
            OperationBody::InvokeHostFunction(op) => match op.host_function {
                HostFunction::InvokeContract(args) => {
                    assert_eq!(args.function_name.0.to_string(), "transfer");
                    assert_eq!(args.args.len(), 3);
                }
                _ => panic!("expected InvokeContract host function"),
            },
            _ => panic!("expected an InvokeHostFunction operation"),
        }
    }

    #[test]
    fn build_operation_rejects_malformed_destination() {
        let signer = signer();
        let mut requirements = native_requirements();
        requirements.pay_to = "not-a-strkey".to_string();
        assert!(signer.build_operation(&requirements, 1).is_err());
    }

    #[test]
    fn network_id_matches_testnet_passphrase() {
        let signer = signer();
        let expected = Sha256::digest(Network::StellarTestnet.info().passphrase.as_bytes());
        assert_eq!(signer.network_id(), Hash(expected.into()));
    }
}
