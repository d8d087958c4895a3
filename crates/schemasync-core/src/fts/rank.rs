//! Relevance scoring over FTS4 `matchinfo(t, 'pcx')` blobs.
//!
//! Layout, in 32-bit native-endian slots: phrase count `p`, column count `c`,
//! then for each phrase and each column three counters: hits in this row,
//! hits across all rows, rows with at least one hit.

/// How counter slots are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterWidth {
    /// The whole 32-bit value.
    #[default]
    Full,
    /// Only the lowest-order byte of each slot, so every counter wraps at 256.
    /// Kept for databases whose stored scores were computed that way.
    LowByte,
}

const SLOT: usize = 4;

/// Parse a comma-separated weight list.
///
/// Empty, unparsable or non-finite entries weigh 1, negative ones 0.
pub fn parse_weights(csv: &str) -> Vec<f64> {
    if csv.trim().is_empty() {
        return Vec::new();
    }
    csv.split(',')
        .map(|entry| match entry.trim().parse::<f64>() {
            Ok(w) if !w.is_finite() => 1.0,
            Ok(w) => w.max(0.0),
            Err(_) => 1.0,
        })
        .collect()
}

/// Render weights in the form [`parse_weights`] reads.
pub fn format_weights(weights: &[f64]) -> String {
    weights
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Score one matched row from its statistics block and weight list.
pub fn rank(block: &[u8], weights_csv: &str, width: CounterWidth) -> f64 {
    score(block, &parse_weights(weights_csv), width)
}

/// Like [`rank`] with already-parsed weights. Columns without a weight count 1.
///
/// A block too short for the counts in its header scores 0.
pub fn score(block: &[u8], weights: &[f64], width: CounterWidth) -> f64 {
    let read = |slot: usize| -> Option<u32> {
        let start = slot.checked_mul(SLOT)?;
        let bytes: [u8; SLOT] = block.get(start..start + SLOT)?.try_into().ok()?;
        let value = u32::from_ne_bytes(bytes);
        Some(match width {
            CounterWidth::Full => value,
            CounterWidth::LowByte => value & 0xff,
        })
    };

    let (Some(phrases), Some(columns)) = (read(0), read(1)) else {
        return 0.0;
    };
    let (phrases, columns) = (phrases as usize, columns as usize);

    let needed = phrases
        .checked_mul(columns)
        .and_then(|cells| cells.checked_mul(3))
        .and_then(|slots| slots.checked_add(2))
        .and_then(|slots| slots.checked_mul(SLOT));
    match needed {
        Some(len) if len <= block.len() => {}
        _ => return 0.0,
    }

    let mut total_score = 0.0;
    for phrase in 0..phrases {
        for column in 0..columns {
            let base = 2 + 3 * (phrase * columns + column);
            let (Some(here), Some(total), Some(rows)) = (read(base), read(base + 1), read(base + 2))
            else {
                return 0.0;
            };
            let relevance = if total > 0 {
                (f64::from(rows) / f64::from(total)) * f64::from(here)
            } else {
                0.0
            };
            let weight = weights.get(column).copied().unwrap_or(1.0);
            total_score += relevance * weight;
        }
    }

    total_score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(slots: &[u32]) -> Vec<u8> {
        slots.iter().flat_map(|s| s.to_ne_bytes()).collect()
    }

    // One phrase over two columns: (here, total, rows) = (2, 4, 2) and (1, 2, 1).
    fn two_columns() -> Vec<u8> {
        block(&[1, 2, 2, 4, 2, 1, 2, 1])
    }

    #[test]
    fn test_parse_weights() {
        assert!(parse_weights("").is_empty());
        assert_eq!(parse_weights("2, 0,x,-3, 0.5"), vec![2.0, 0.0, 1.0, 0.0, 0.5]);
        assert_eq!(format_weights(&[2.0, 0.5]), "2,0.5");
    }

    #[test]
    fn test_non_finite_weights_count_as_one() {
        assert_eq!(parse_weights("inf,-inf,NaN"), vec![1.0, 1.0, 1.0]);

        // The second column has no hits, so an infinite weight would make it NaN.
        let data = block(&[1, 2, 2, 4, 2, 0, 0, 0]);
        let score = rank(&data, &format_weights(&[1.0, f64::INFINITY]), CounterWidth::Full);
        assert!(score.is_finite());
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_weights() {
        let score = rank(&two_columns(), "", CounterWidth::Full);
        assert!((score - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_column_weights() {
        let score = rank(&two_columns(), "2,0", CounterWidth::Full);
        assert!((score - 2.0).abs() < 1e-9);
        assert_eq!(rank(&two_columns(), "0,0", CounterWidth::Full), 0.0);
    }

    #[test]
    fn test_weight_increase_never_lowers_score() {
        let mut previous = rank(&two_columns(), "1,0", CounterWidth::Full);
        for weight in ["1,0.5", "1,1", "1,3", "1,10"] {
            let next = rank(&two_columns(), weight, CounterWidth::Full);
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn test_zero_totals_contribute_nothing() {
        let data = block(&[1, 1, 0, 0, 0]);
        assert_eq!(rank(&data, "", CounterWidth::Full), 0.0);
    }

    #[test]
    fn test_truncated_block_scores_zero() {
        let mut data = two_columns();
        data.truncate(data.len() - 2);
        assert_eq!(rank(&data, "", CounterWidth::Full), 0.0);
        assert_eq!(rank(&[], "", CounterWidth::Full), 0.0);
        assert_eq!(rank(&block(&[u32::MAX, u32::MAX]), "", CounterWidth::Full), 0.0);
    }

    #[test]
    fn test_counter_width() {
        // 256 hits in this row out of 512 across 2 rows.
        let data = block(&[1, 1, 256, 512, 2]);
        let full = rank(&data, "", CounterWidth::Full);
        assert!((full - 1.0).abs() < 1e-9);

        // The low byte of 256 and 512 is 0, so the column drops out.
        assert_eq!(rank(&data, "", CounterWidth::LowByte), 0.0);

        let small = block(&[1, 1, 3, 6, 2]);
        assert_eq!(
            rank(&small, "", CounterWidth::Full),
            rank(&small, "", CounterWidth::LowByte)
        );
    }
}
