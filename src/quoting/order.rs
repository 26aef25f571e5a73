//! Validation of externally supplied orders.

use serde::{Deserialize, Serialize};

use crate::quoting::types::{CryptoAsset, FiatAsset, OrderKind, OrderRequest};

/// Raw order as received on the query string.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteQuery {
    pub kind: Option<String>,
    pub receive_asset: Option<String>,
    pub pay_asset: Option<String>,
    pub volume: Option<String>,
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn required<'a>(
    field: &'static str,
    value: &'a Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match value.as_deref() {
        Some(v) => Some(v),
        None => {
            errors.push(FieldError::new(field, "Required"));
            None
        }
    }
}

fn parse_asset<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<&str>,
    expected: &str,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(asset) => Some(asset),
        Err(_) => {
            errors.push(FieldError::new(
                field,
                format!("'{raw}' is not a supported {expected} asset"),
            ));
            None
        }
    }
}

impl RouteQuery {
    /// Validate every field, reporting all problems at once.
    pub fn into_order(self) -> Result<OrderRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        let kind = required("kind", &self.kind, &mut errors).and_then(|raw| {
            let parsed = raw.parse::<OrderKind>().ok();
            if parsed.is_none() {
                errors.push(FieldError::new(
                    "kind",
                    format!("expected 'buy' | 'sell' | 'swap', received '{raw}'"),
                ));
            }
            parsed
        });
        let receive = required("receiveAsset", &self.receive_asset, &mut errors);
        let pay = required("payAsset", &self.pay_asset, &mut errors);
        let volume = required("volume", &self.volume, &mut errors).and_then(|raw| {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v > 0.0 => Some(v),
                _ => {
                    errors.push(FieldError::new("volume", "Number must be greater than 0"));
                    None
                }
            }
        });

        let order = match kind {
            Some(OrderKind::Buy) => {
                let receive = parse_asset::<CryptoAsset>("receiveAsset", receive, "crypto", &mut errors);
                let pay = parse_asset::<FiatAsset>("payAsset", pay, "fiat", &mut errors);
                match (receive, pay, volume) {
                    (Some(receive), Some(pay), Some(receive_volume)) => Some(OrderRequest::Buy {
                        receive,
                        pay,
                        receive_volume,
                    }),
                    _ => None,
                }
            }
            Some(OrderKind::Sell) => {
                let receive = parse_asset::<FiatAsset>("receiveAsset", receive, "fiat", &mut errors);
                let pay = parse_asset::<CryptoAsset>("payAsset", pay, "crypto", &mut errors);
                match (receive, pay, volume) {
                    (Some(receive), Some(pay), Some(receive_volume)) => Some(OrderRequest::Sell {
                        receive,
                        pay,
                        receive_volume,
                    }),
                    _ => None,
                }
            }
            Some(OrderKind::Swap) => {
                let receive = parse_asset::<CryptoAsset>("receiveAsset", receive, "crypto", &mut errors);
                let pay = parse_asset::<CryptoAsset>("payAsset", pay, "crypto", &mut errors);
                match (receive, pay, volume) {
                    (Some(receive), Some(pay), Some(pay_volume)) => Some(OrderRequest::Swap {
                        receive,
                        pay,
                        pay_volume,
                    }),
                    _ => None,
                }
            }
            None => None,
        };

        match order {
            Some(order) if errors.is_empty() => Ok(order),
            _ => Err(errors),
        }
    }
}
