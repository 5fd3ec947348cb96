use serde::{Deserialize, Serialize};

// [open_time, open, high, low, close, volume, close_time, ...], prices as strings
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRow {
    pub open_time: u64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl TryFrom<Vec<serde_json::Value>> for KlineRow {
    type Error = String;

    fn try_from(row: Vec<serde_json::Value>) -> Result<Self, Self::Error> {
        if row.len() < 6 {
            return Err(format!("kline row has {} fields, expected at least 6", row.len()));
        }

        let open_time = row[0]
            .as_u64()
            .ok_or_else(|| format!("invalid open time: {}", row[0]))?;
        let field = |index: usize| -> Result<String, String> {
            row[index]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("field {index} is not a string: {}", row[index]))
        };

        Ok(KlineRow {
            open_time,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        })
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndexResponse {
    pub symbol: String,
    pub mark_price: String,
    pub last_funding_rate: String,
    pub next_funding_time: u64,
    pub time: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}
