//! Ranked `{address, value}` rows shared by every report.

use std::cmp::Ordering;

use serde::Serialize;

/// One row of a ranked report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ranked<V> {
    pub address: String,
    pub value: V,
}

/// Sorts rows by descending value and keeps the first `top`.
///
/// Ties are broken by address so output is stable across runs.
pub fn top_desc<V, I>(rows: I, top: usize) -> Vec<Ranked<V>>
where
    V: PartialOrd,
    I: IntoIterator<Item = (String, V)>,
{
    let mut ranked: Vec<Ranked<V>> = rows
        .into_iter()
        .map(|(address, value)| Ranked { address, value })
        .collect();
    ranked.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    });
    ranked.truncate(top);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_highest_values_first() {
        let rows = vec![
            ("0xa".to_string(), 3_u64),
            ("0xb".to_string(), 9),
            ("0xc".to_string(), 5),
        ];
        let ranked = top_desc(rows, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].address, "0xb");
        assert_eq!(ranked[1].address, "0xc");
    }

    #[test]
    fn ties_order_by_address() {
        let rows = vec![("0xz".to_string(), 1.0_f64), ("0xa".to_string(), 1.0)];
        let ranked = top_desc(rows, 10);
        assert_eq!(ranked[0].address, "0xa");
    }
}
