//! The price a route-rule charges, before it is turned into a full
//! [`PaymentRequirements`] challenge for a specific request.

use stellar_x402_types::network::Network;
use stellar_x402_types::proto::{Asset, PaymentRequirements, Scheme};

/// Contract assets interpret decimal strings against their own decimal count; the wire
/// convention defaults to 7 (matching the native asset) when a rule doesn't override it.
const DEFAULT_ASSET_DECIMALS: u32 = 7;

/// A priced route: everything [`PaymentRequirements`] needs except the `resource` URL,
/// which is filled in per-request from the incoming URI.
#[derive(Debug, Clone)]
pub struct PriceSpec {
    pub network: Network,
    pub asset: Asset,
    pub max_amount_required: String,
    raw_amount: String,
    decimals: u32,
    pub pay_to: String,
    pub description: String,
    pub mime_type: String,
    pub max_timeout_seconds: u32,
    pub extra: Option<serde_json::Value>,
}

impl PriceSpec {
    /// `amount` may be an integer string (passed through unchanged) or a decimal string,
    /// which is converted to the asset's smallest unit and truncated: 10^7 per unit for
    /// the native asset, or the rule's decimal count (default 7) for a contract asset.
    pub fn new(
        network: Network,
        asset: Asset,
        amount: impl Into<String>,
        pay_to: impl Into<String>,
    ) -> Self {
        let raw_amount = amount.into();
        let decimals = DEFAULT_ASSET_DECIMALS;
        let max_amount_required = convert_decimal_amount(&raw_amount, decimals);
        Self {
            network,
            asset,
            max_amount_required,
            raw_amount,
            decimals,
            pay_to: pay_to.into(),
            description: String::new(),
            mime_type: "application/json".to_string(),
            max_timeout_seconds: 300,
            extra: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_max_timeout_seconds(mut self, seconds: u32) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Overrides the decimal count used to interpret a decimal-string amount for a
    /// contract asset; has no effect on an already-integer amount.
    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self.max_amount_required = convert_decimal_amount(&self.raw_amount, decimals);
        self
    }

    /// Builds the [`PaymentRequirements`] challenge for a request against `resource`.
    pub fn into_requirements(self, resource: String) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Exact,
            network: self.network,
            max_amount_required: self.max_amount_required,
            resource,
            description: self.description,
            mime_type: self.mime_type,
            pay_to: self.pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset: self.asset,
            extra: self.extra,
        }
    }
}

/// Converts a decimal-string amount to the asset's smallest unit, truncating any
/// fractional digits past `decimals`. An amount with no `.` passes through unchanged.
fn convert_decimal_amount(amount: &str, decimals: u32) -> String {
    let Some(dot_pos) = amount.find('.') else {
        return amount.to_string();
    };
    let int_part = &amount[..dot_pos];
    let frac_part = &amount[dot_pos + 1..];
    let decimals = decimals as usize;

    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.push_str(&"0".repeat(decimals - frac_part.len()));
    }

    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_amount_passes_through_unchanged() {
        let spec = PriceSpec::new(Network::StellarTestnet, Asset::Native, "10000000", "GPAYTO");
        assert_eq!(spec.max_amount_required, "10000000");
    }

    #[test]
    fn native_decimal_amount_converts_at_seven_decimals() {
        let spec = PriceSpec::new(Network::StellarTestnet, Asset::Native, "1.5", "GPAYTO");
        assert_eq!(spec.max_amount_required, "15000000");
    }

    #[test]
    fn native_decimal_amount_truncates_extra_precision() {
        let spec = PriceSpec::new(
            Network::StellarTestnet,
            Asset::Native,
            "0.00000019",
            "GPAYTO",
        );
        assert_eq!(spec.max_amount_required, "1");
    }

    #[test]
    fn contract_asset_honors_overridden_decimal_count() {
        let spec = PriceSpec::new(
            Network::StellarTestnet,
            Asset::Contract("CCONTRACT".to_string()),
            "1.5",
            "GPAYTO",
        )
        .with_decimals(2);
        assert_eq!(spec.max_amount_required, "150");
    }
}
