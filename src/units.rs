use crate::error::FormatError;
use std::collections::BTreeMap;
use tracing::debug;

/// Convert a Slurm elapsed time (`HH:MM:SS` or `D-HH:MM:SS`) to hours
pub fn parse_elapsed(text: &str) -> Result<f64, FormatError> {
    let text = text.trim();
    let invalid = || FormatError::Elapsed(text.to_string());

    let (days, clock) = match text.split_once('-') {
        Some((days, clock)) => (days.parse::<u64>().map_err(|_| invalid())?, clock),
        None => (0, text),
    };

    let parts = clock
        .split(':')
        .map(|part| part.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let [hours, minutes, seconds] = parts[..] else {
        return Err(invalid());
    };

    Ok(days as f64 * 24.0 + hours as f64 + minutes as f64 / 60.0 + seconds as f64 / 3600.0)
}

/// Return memory in gigabytes from a Slurm memory string such as `8000M` or `1.5T`.
///
/// An empty string is zero. A bare number carries no unit and is read as
/// megabytes, which is what Slurm assumes. Unknown unit letters yield zero.
pub fn parse_memory(text: &str) -> Result<f64, FormatError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }

    let (number, unit) = match text.chars().last() {
        Some(last) if last.is_ascii_alphabetic() => {
            (&text[..text.len() - 1], last.to_ascii_uppercase())
        }
        _ => (text, 'M'),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| FormatError::Memory(text.to_string()))?;

    let factor = match unit {
        'K' => 1.0 / 1024.0 / 1024.0,
        'M' => 1.0 / 1024.0,
        'G' => 1.0,
        'T' => 1024.0,
        other => {
            debug!(memory = %text, unit = %other, "Unknown memory unit, counting as zero");
            0.0
        }
    };

    Ok(value * factor)
}

/// Parse a TRES string like `cpu=4,mem=8000M,gres/gpu=2` into key/value pairs.
///
/// Entries without `=` are ignored; values keep their raw form.
pub fn parse_resource_spec(text: &str) -> BTreeMap<String, String> {
    text.split(',')
        .filter_map(|item| item.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Number of GPUs allocated according to a parsed TRES mapping.
///
/// Reads `gres/gpu`, falling back to `gpu`. Values such as `2(IDX:0,1)` are
/// accepted; the parenthesized suffix is dropped.
pub fn gpu_count(tres: &BTreeMap<String, String>) -> Result<u64, FormatError> {
    let raw = tres
        .get("gres/gpu")
        .or_else(|| tres.get("gpu"))
        .map(String::as_str)
        .unwrap_or("0");

    let count = raw.split('(').next().unwrap_or("").trim();
    if count.is_empty() {
        return Ok(0);
    }

    count.parse().map_err(|_| FormatError::Count {
        field: "gres/gpu",
        value: raw.to_string(),
    })
}

/// Parse an integer count column such as `NCPUS`; blank counts as zero
pub fn parse_count(field: &'static str, text: &str) -> Result<u64, FormatError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(|_| FormatError::Count {
        field,
        value: text.to_string(),
    })
}
