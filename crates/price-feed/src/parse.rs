//! Payload parsing into fixed-point samples

use serde_json::Value;

use oracle_core::{parse_units, PriceFeedError, PriceFeedResult, PriceSample};

/// Extracts the price at a JSON pointer and scales it to `decimals`
#[derive(Debug, Clone)]
pub struct PayloadParser {
    pointer: String,
    decimals: u8,
}

impl PayloadParser {
    pub fn new(pointer: impl Into<String>, decimals: u8) -> Self {
        Self {
            pointer: pointer.into(),
            decimals,
        }
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn parse(&self, text: &str) -> PriceFeedResult<PriceSample> {
        let payload: Value = serde_json::from_str(text)
            .map_err(|e| PriceFeedError::InvalidMessage(e.to_string()))?;
        self.parse_value(&payload)
    }

    pub fn parse_value(&self, payload: &Value) -> PriceFeedResult<PriceSample> {
        let field = payload
            .pointer(&self.pointer)
            .ok_or_else(|| PriceFeedError::MissingField(self.pointer.clone()))?;

        let text = match field {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(PriceFeedError::InvalidMessage(format!(
                    "price at {} is not a number: {}",
                    self.pointer, other
                )))
            }
        };

        let value = parse_units(&text, self.decimals)?;
        Ok(PriceSample::new(value, self.decimals))
    }
}

/// Subscription acknowledgements and similar replies that carry no price
pub fn is_control_message(payload: &Value) -> bool {
    payload.get("id").is_some() && payload.get("result").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_binance_trade_payload() {
        let parser = PayloadParser::new("/p", 8);
        let text = r#"{"e":"trade","E":1700000000000,"s":"ETHUSDT","t":1,"p":"2650.37000000","q":"0.01","T":1700000000000,"m":true}"#;
        let sample = parser.parse(text).unwrap();
        assert_eq!(sample.value, U256::from(2650_37000000u64));
        assert_eq!(sample.decimals, 8);
    }

    #[test]
    fn test_nested_numeric_payload() {
        let parser = PayloadParser::new("/data/price", 8);
        let sample = parser.parse(r#"{"data":{"price":101.01}}"#).unwrap();
        assert_eq!(sample.value, U256::from(101_01000000u64));
    }

    #[test]
    fn test_rounds_at_last_place() {
        let parser = PayloadParser::new("/p", 2);
        let sample = parser.parse(r#"{"p":"1.005"}"#).unwrap();
        assert_eq!(sample.value, U256::from(101u64));
    }

    #[test]
    fn test_missing_field() {
        let parser = PayloadParser::new("/p", 8);
        assert!(matches!(
            parser.parse(r#"{"q":"1"}"#),
            Err(PriceFeedError::MissingField(_))
        ));
    }

    #[test]
    fn test_malformed_values_rejected() {
        let parser = PayloadParser::new("/p", 8);
        for text in [
            r#"{"p":"-1.5"}"#,
            r#"{"p":""}"#,
            r#"{"p":"abc"}"#,
            r#"{"p":null}"#,
            r#"{"p":[1]}"#,
            "not json",
        ] {
            assert!(parser.parse(text).is_err(), "{}", text);
        }
    }

    #[test]
    fn test_control_messages() {
        let ack: Value = serde_json::from_str(r#"{"result":null,"id":1}"#).unwrap();
        assert!(is_control_message(&ack));

        let trade: Value = serde_json::from_str(r#"{"p":"1"}"#).unwrap();
        assert!(!is_control_message(&trade));
    }
}
