use crate::error::{BridgeError, Result};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currencies the payment processor charges in whole units.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// A positive amount to charge, in major currency units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct PaymentAmount(Decimal);

impl PaymentAmount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BridgeError::InvalidCommand(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Amount in the smallest unit of `currency`, as the SDK expects it.
    pub fn minor_units(&self, currency: &str) -> Result<i64> {
        let scaled = if ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_uppercase().as_str()) {
            self.0
        } else {
            self.0 * Decimal::ONE_HUNDRED
        };
        if !scaled.fract().is_zero() {
            return Err(BridgeError::InvalidCommand(format!(
                "{} {currency} is not a whole number of minor units",
                self.0
            )));
        }
        i64::try_from(scaled).map_err(|e| BridgeError::InvalidCommand(e.to_string()))
    }
}

impl TryFrom<Decimal> for PaymentAmount {
    type Error = BridgeError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

/// Options for `initialize`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitOptions {
    pub publishable_key: String,
}

impl InitOptions {
    pub fn new(publishable_key: impl Into<String>) -> Self {
        Self {
            publishable_key: publishable_key.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.publishable_key.trim().is_empty() {
            return Err(BridgeError::InvalidCommand(
                "A valid publishable key is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for `init_payment_context`, as sent by the runtime.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContextOptions {
    pub amount: PaymentAmount,
    pub currency: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub requires_shipping: bool,
}

impl PaymentContextOptions {
    pub fn new(amount: PaymentAmount, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            company_name: None,
            requires_shipping: false,
        }
    }

    pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = Some(company_name.into());
        self
    }

    /// Asks the SDK to collect a shipping address along with the payment method.
    pub fn with_shipping_required(mut self) -> Self {
        self.requires_shipping = true;
        self
    }

    /// Parses and validates options received as JSON from the runtime.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let options: Self = serde_json::from_value(value)
            .map_err(|e| BridgeError::InvalidCommand(format!("invalid payment context options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BridgeError::InvalidCommand(format!(
                "`{}` is not an ISO 4217 currency code",
                self.currency
            )));
        }
        self.amount.minor_units(&self.currency)?;
        Ok(())
    }

    pub fn amount_minor_units(&self) -> Result<i64> {
        self.amount.minor_units(&self.currency)
    }
}

/// Options for `request_payment`: the payment intent to confirm.
///
/// `return_url` is where the processor sends the customer back after an
/// out-of-app authorization step; without it such payments fail.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentIntentOptions {
    #[serde(alias = "clientSecret")]
    pub client_secret: String,
    #[serde(default, alias = "returnUrl")]
    pub return_url: Option<String>,
}

impl PaymentIntentOptions {
    pub fn new(client_secret: impl Into<String>) -> Self {
        Self {
            client_secret: client_secret.into(),
            return_url: None,
        }
    }

    pub fn with_return_url(mut self, return_url: impl Into<String>) -> Self {
        self.return_url = Some(return_url.into());
        self
    }

    /// Parses and validates options received as JSON from the runtime.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let options: Self = serde_json::from_value(value)
            .map_err(|e| BridgeError::InvalidCommand(format!("invalid payment intent options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_secret.trim().is_empty() {
            return Err(BridgeError::InvalidCommand(
                "A payment intent client secret is required".to_string(),
            ));
        }
        if let Some(return_url) = &self.return_url {
            Url::parse(return_url).map_err(|e| {
                BridgeError::InvalidCommand(format!("`{return_url}` is not a valid return URL: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_amount_validation() {
        assert!(PaymentAmount::new(dec!(10.50)).is_ok());
        assert!(PaymentAmount::new(dec!(0)).is_err());
        assert!(PaymentAmount::new(dec!(-1.0)).is_err());
    }

    #[test]
    fn test_minor_units() {
        let amount = PaymentAmount::new(dec!(10.50)).unwrap();
        assert_eq!(amount.minor_units("usd").unwrap(), 1050);

        let yen = PaymentAmount::new(dec!(500)).unwrap();
        assert_eq!(yen.minor_units("JPY").unwrap(), 500);

        let fractional = PaymentAmount::new(dec!(1.005)).unwrap();
        assert!(fractional.minor_units("EUR").is_err());
        assert!(PaymentAmount::new(dec!(0.5)).unwrap().minor_units("JPY").is_err());
    }

    #[test]
    fn test_options_from_runtime_json() {
        let options = PaymentContextOptions::from_value(json!({
            "amount": "12.99",
            "currency": "eur",
            "companyName": "Acme",
        }))
        .unwrap();

        assert_eq!(options.amount.value(), dec!(12.99));
        assert_eq!(options.company_name.as_deref(), Some("Acme"));
        assert!(!options.requires_shipping);
        assert_eq!(options.amount_minor_units().unwrap(), 1299);
    }

    #[test]
    fn test_options_reject_bad_shapes() {
        assert!(PaymentContextOptions::from_value(json!({"amount": "-3", "currency": "usd"})).is_err());
        assert!(PaymentContextOptions::from_value(json!({"amount": "3", "currency": "dollars"})).is_err());
        assert!(PaymentContextOptions::from_value(json!({"currency": "usd"})).is_err());
    }

    #[test]
    fn test_options_builders() {
        let options = PaymentContextOptions::new(PaymentAmount::new(dec!(5)).unwrap(), "usd")
            .with_company_name("Acme")
            .with_shipping_required();
        assert_eq!(options.company_name.as_deref(), Some("Acme"));
        assert!(options.requires_shipping);
    }

    #[test]
    fn test_intent_options_from_runtime_json() {
        let options = PaymentIntentOptions::from_value(json!({
            "client_secret": "pi_3Kx2_secret_abc",
            "return_url": "paybridge://stripe-redirect",
        }))
        .unwrap();
        assert_eq!(options.client_secret, "pi_3Kx2_secret_abc");
        assert_eq!(options.return_url.as_deref(), Some("paybridge://stripe-redirect"));

        let camel = PaymentIntentOptions::from_value(json!({"clientSecret": "pi_1_secret_2"})).unwrap();
        assert_eq!(camel, PaymentIntentOptions::new("pi_1_secret_2"));
    }

    #[test]
    fn test_intent_options_reject_bad_shapes() {
        assert!(PaymentIntentOptions::from_value(json!({})).is_err());
        assert!(PaymentIntentOptions::from_value(json!({"client_secret": "  "})).is_err());
        assert!(PaymentIntentOptions::from_value(json!({"client_secret": 42})).is_err());

        let err = PaymentIntentOptions::new("pi_1_secret_2")
            .with_return_url("not a url")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("not a valid return URL"), "{err}");
    }

    #[test]
    fn test_init_options_require_key() {
        assert!(InitOptions::new("pk_test_123").validate().is_ok());
        assert!(InitOptions::new("  ").validate().is_err());
    }
}
