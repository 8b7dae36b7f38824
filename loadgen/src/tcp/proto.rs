use serde::{Deserialize, Serialize};

/// Message delimiter.
pub const DELIM: u8 = b'\n';

/// Operators understood by the server.
pub const OPERATORS: [&str; 4] = ["+", "-", "*", "/"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerReq {
    pub id: i64,
    pub operands: Vec<i64>,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerResp {
    pub id: i64,
    pub formula: String,
    pub result: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// Folds the operands left to right with the given operator.
pub fn op(operands: &[i64], operator: &str) -> Result<i64, String> {
    let (first, rest) = operands.split_first().ok_or("no operands")?;

    rest.iter().try_fold(*first, |acc, &v| {
        let out = match operator {
            "+" => acc.checked_add(v),
            "-" => acc.checked_sub(v),
            "*" => acc.checked_mul(v),
            "/" if v == 0 => return Err("division by zero".to_string()),
            "/" => acc.checked_div(v),
            op => return Err(format!("unsupported operator: {op}")),
        };

        out.ok_or_else(|| "integer overflow".to_string())
    })
}

/// Renders the formula, e.g. "3 + 4 = 7" or "3 + 4 != 8".
pub fn formula(operands: &[i64], operator: &str, result: i64, equal: bool) -> String {
    let lhs = operands
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&format!(" {operator} "));
    let eq = if equal { "=" } else { "!=" };

    format!("{lhs} {eq} {result}")
}
