use std::collections::BTreeMap;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::types::{Cell, CellCoord, RuleConfig, Table};

/// Why a cell was primary-suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// Too few contributors
    Frequency,
    /// Top contributors dominate a row or column total
    Dominance,
    /// Largest contributor estimable within the p-percent tolerance
    PPercent,
}

const REASON_BITS: [(SuppressionReason, u8); 3] = [
    (SuppressionReason::Frequency, 0b001),
    (SuppressionReason::Dominance, 0b010),
    (SuppressionReason::PPercent, 0b100),
];

/// Set of triggered rules for one cell, stored as a bitmask.
///
/// The rules are independent and their triggers are unioned, so a single
/// cell can carry several reasons at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReasonSet {
    bits: u8,
}

impl ReasonSet {
    pub fn single(reason: SuppressionReason) -> Self {
        let mut set = Self::default();
        set.insert(reason);
        set
    }

    pub fn insert(&mut self, reason: SuppressionReason) {
        self.bits |= Self::bit(reason);
    }

    pub fn contains(&self, reason: SuppressionReason) -> bool {
        self.bits & Self::bit(reason) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = SuppressionReason> + '_ {
        REASON_BITS
            .iter()
            .filter(move |(_, bit)| self.bits & bit != 0)
            .map(|(reason, _)| *reason)
    }

    fn bit(reason: SuppressionReason) -> u8 {
        match reason {
            SuppressionReason::Frequency => 0b001,
            SuppressionReason::Dominance => 0b010,
            SuppressionReason::PPercent => 0b100,
        }
    }
}

// Serialized as the list of reason names so exporters see
// ["frequency", "dominance"] rather than a raw bitmask.
impl Serialize for ReasonSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for reason in self.iter() {
            seq.serialize_element(&reason)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ReasonSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReasonSetVisitor;

        impl<'de> Visitor<'de> for ReasonSetVisitor {
            type Value = ReasonSet;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sequence of suppression reasons")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut set = ReasonSet::default();
                while let Some(reason) = seq.next_element::<SuppressionReason>()? {
                    set.insert(reason);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_seq(ReasonSetVisitor)
    }
}

/// Primary suppressions keyed by coordinate, iterated row-major
pub type PrimarySet = BTreeMap<CellCoord, ReasonSet>;

/// Apply the three protection rules to every cell and union the triggers.
///
/// Deterministic and total: a structurally valid table always classifies.
/// Cells with no contributors are exempt from all rules and are never
/// flagged.
pub fn classify(table: &Table, config: &RuleConfig) -> PrimarySet {
    let mut primary: PrimarySet = BTreeMap::new();

    // Frequency and p-percent are per-cell checks
    for (coord, cell) in table.iter() {
        if cell.is_empty() {
            continue;
        }
        let mut reasons = ReasonSet::default();
        if cell.contributor_count() < config.min_frequency {
            reasons.insert(SuppressionReason::Frequency);
        }
        if p_percent_triggers(cell, config.p_percent) {
            reasons.insert(SuppressionReason::PPercent);
        }
        if !reasons.is_empty() {
            primary.insert(coord, reasons);
        }
    }

    // Dominance is evaluated once per row and once per column; a cell
    // triggers if either of its groups is dominated and it is among the
    // dominating top-n values.
    for row in 0..table.rows() {
        let members: Vec<(CellCoord, f64)> = (0..table.cols())
            .map(|col| (CellCoord::new(row, col), table.cell(row, col)))
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(coord, cell)| (coord, cell.value()))
            .collect();
        for coord in dominated_members(&members, config.dominance_n, config.dominance_k) {
            primary
                .entry(coord)
                .or_default()
                .insert(SuppressionReason::Dominance);
        }
    }
    for col in 0..table.cols() {
        let members: Vec<(CellCoord, f64)> = (0..table.rows())
            .map(|row| (CellCoord::new(row, col), table.cell(row, col)))
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(coord, cell)| (coord, cell.value()))
            .collect();
        for coord in dominated_members(&members, config.dominance_n, config.dominance_k) {
            primary
                .entry(coord)
                .or_default()
                .insert(SuppressionReason::Dominance);
        }
    }

    debug!(primary = primary.len(), "primary classification complete");
    primary
}

/// P-percent rule.
///
/// With `T` the cell total, `L` its largest contributor and `O = T - L` the
/// remainder, an outside observer's derivable interval around `L` has
/// half-width `T * p / 100`. The estimate is disclosive exactly when the
/// remainder is smaller than that half-width. The comparison is strict: a
/// remainder equal to the tolerance sits on the interval boundary and is
/// treated as safe.
fn p_percent_triggers(cell: &Cell, p_percent: f64) -> bool {
    // A single contributor is already caught by the frequency rule, and the
    // estimation attack needs a published total to subtract from.
    if cell.contributor_count() < 2 {
        return false;
    }
    let total = cell.value();
    if total <= 0.0 {
        return false;
    }
    let largest = match cell.contributors().largest() {
        Some(l) => l,
        None => return false,
    };
    let remainder = total - largest;
    remainder < total * p_percent / 100.0
}

/// Dominance rule for one row or column group.
///
/// Returns the coordinates to flag: empty when the top-n share of the group
/// total does not strictly exceed `k`, otherwise the member cells whose
/// values belong to the top-n.
fn dominated_members(members: &[(CellCoord, f64)], n: usize, k: f64) -> Vec<CellCoord> {
    if members.len() < 2 {
        return Vec::new();
    }
    let total: f64 = members.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut sorted: Vec<f64> = members.iter().map(|(_, v)| *v).collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let n_eff = n.min(sorted.len());
    let top_sum: f64 = sorted[..n_eff].iter().sum();
    if top_sum / total * 100.0 <= k {
        return Vec::new();
    }
    let cutoff = sorted[n_eff - 1];
    members
        .iter()
        .filter(|(_, v)| *v >= cutoff)
        .map(|(coord, _)| *coord)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Table;

    fn config() -> RuleConfig {
        RuleConfig::default()
    }

    #[test]
    fn test_reason_set_union() {
        let mut set = ReasonSet::default();
        assert!(set.is_empty());
        set.insert(SuppressionReason::Frequency);
        set.insert(SuppressionReason::PPercent);
        set.insert(SuppressionReason::Frequency);
        assert!(set.contains(SuppressionReason::Frequency));
        assert!(set.contains(SuppressionReason::PPercent));
        assert!(!set.contains(SuppressionReason::Dominance));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![SuppressionReason::Frequency, SuppressionReason::PPercent]
        );
    }

    #[test]
    fn test_reason_set_serde_round_trip() {
        let mut set = ReasonSet::default();
        set.insert(SuppressionReason::Dominance);
        set.insert(SuppressionReason::Frequency);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["frequency","dominance"]"#);
        let back: ReasonSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_frequency_rule_flags_small_counts() {
        let table = Table::from_counts(1, 3, vec![2, 3, 10]).unwrap();
        let config = RuleConfig {
            min_frequency: 3,
            ..config()
        };
        let primary = classify(&table, &config);
        assert!(primary[&CellCoord::new(0, 0)].contains(SuppressionReason::Frequency));
        assert!(!primary.contains_key(&CellCoord::new(0, 1)));
        assert!(!primary.contains_key(&CellCoord::new(0, 2)));
    }

    #[test]
    fn test_empty_cells_are_exempt() {
        let cells = vec![Cell::empty(), Cell::frequency(1), Cell::frequency(8), Cell::frequency(9)];
        let table = Table::new(2, 2, cells).unwrap();
        let primary = classify(&table, &config());
        // count 0 is exempt even though 0 < min_frequency
        assert!(!primary.contains_key(&CellCoord::new(0, 0)));
        assert!(primary[&CellCoord::new(0, 1)].contains(SuppressionReason::Frequency));
    }

    #[test]
    fn test_dominance_flags_top_contributor_only() {
        // Row 0 total 100, top value 90 -> 90% > 80%: only the 90 is flagged
        let cells = vec![
            Cell::magnitude(90.0, vec![30.0, 30.0, 30.0]),
            Cell::magnitude(6.0, vec![2.0, 2.0, 2.0]),
            Cell::magnitude(4.0, vec![1.5, 1.5, 1.0]),
            // second row keeps the columns from dominating
            Cell::magnitude(85.0, vec![28.0, 28.0, 29.0]),
            Cell::magnitude(7.0, vec![2.5, 2.5, 2.0]),
            Cell::magnitude(5.0, vec![2.0, 2.0, 1.0]),
        ];
        let table = Table::new(2, 3, cells).unwrap();
        let config = RuleConfig {
            min_frequency: 1,
            dominance_n: 1,
            dominance_k: 80.0,
            p_percent: 10.0,
        };
        let primary = classify(&table, &config);
        assert!(primary[&CellCoord::new(0, 0)].contains(SuppressionReason::Dominance));
        assert!(primary[&CellCoord::new(1, 0)].contains(SuppressionReason::Dominance));
        assert!(!primary.contains_key(&CellCoord::new(0, 1)));
        assert!(!primary.contains_key(&CellCoord::new(1, 2)));
    }

    #[test]
    fn test_dominance_share_at_threshold_is_safe() {
        // Top value is exactly 80% of the row total: not strictly above k
        let cells = vec![
            Cell::magnitude(80.0, vec![20.0, 20.0, 20.0, 20.0]),
            Cell::magnitude(10.0, vec![3.0, 3.0, 4.0]),
            Cell::magnitude(10.0, vec![3.0, 3.0, 4.0]),
        ];
        let table = Table::new(1, 3, cells).unwrap();
        let config = RuleConfig {
            min_frequency: 1,
            dominance_n: 1,
            dominance_k: 80.0,
            p_percent: 10.0,
        };
        let primary = classify(&table, &config);
        assert!(primary.is_empty());
    }

    #[test]
    fn test_p_percent_boundary_values() {
        // total 100, p 10 -> tolerance 10
        let config = RuleConfig {
            min_frequency: 1,
            dominance_n: 1,
            dominance_k: 100.0,
            p_percent: 10.0,
        };
        // remainder 9 < 10: disclosive
        let inside = Table::new(
            1,
            2,
            vec![
                Cell::magnitude(100.0, vec![91.0, 5.0, 4.0]),
                Cell::magnitude(100.0, vec![50.0, 30.0, 20.0]),
            ],
        )
        .unwrap();
        let primary = classify(&inside, &config);
        assert!(primary[&CellCoord::new(0, 0)].contains(SuppressionReason::PPercent));
        assert!(!primary.contains_key(&CellCoord::new(0, 1)));

        // remainder exactly 10: on the interval boundary, safe
        let boundary = Table::new(
            1,
            2,
            vec![
                Cell::magnitude(100.0, vec![90.0, 6.0, 4.0]),
                Cell::magnitude(100.0, vec![50.0, 30.0, 20.0]),
            ],
        )
        .unwrap();
        assert!(classify(&boundary, &config).is_empty());

        // remainder 11 > 10: safe
        let outside = Table::new(
            1,
            2,
            vec![
                Cell::magnitude(100.0, vec![89.0, 7.0, 4.0]),
                Cell::magnitude(100.0, vec![50.0, 30.0, 20.0]),
            ],
        )
        .unwrap();
        assert!(classify(&outside, &config).is_empty());
    }

    #[test]
    fn test_p_percent_needs_two_contributors() {
        // A lone contributor is the whole cell; the p-percent attack does
        // not apply (the frequency rule covers it).
        let config = RuleConfig {
            min_frequency: 1,
            dominance_n: 1,
            dominance_k: 100.0,
            p_percent: 10.0,
        };
        let table = Table::new(
            1,
            2,
            vec![
                Cell::magnitude(100.0, vec![100.0]),
                Cell::magnitude(100.0, vec![50.0, 30.0, 20.0]),
            ],
        )
        .unwrap();
        assert!(classify(&table, &config).is_empty());
    }

    #[test]
    fn test_shadow_breakdown_supports_p_percent() {
        let config = RuleConfig {
            min_frequency: 1,
            dominance_n: 1,
            dominance_k: 100.0,
            p_percent: 10.0,
        };
        let table = Table::new(
            1,
            2,
            vec![
                Cell::with_shadow(100.0, 4, 95.0),
                Cell::with_shadow(100.0, 4, 60.0),
            ],
        )
        .unwrap();
        let primary = classify(&table, &config);
        assert!(primary[&CellCoord::new(0, 0)].contains(SuppressionReason::PPercent));
        assert!(!primary.contains_key(&CellCoord::new(0, 1)));
    }

    #[test]
    fn test_reasons_accumulate() {
        // Two contributors (below min_frequency 3) with a tight remainder:
        // both frequency and p-percent fire on the same cell.
        let config = RuleConfig {
            min_frequency: 3,
            dominance_n: 1,
            dominance_k: 100.0,
            p_percent: 10.0,
        };
        let table = Table::new(
            1,
            2,
            vec![
                Cell::magnitude(100.0, vec![95.0, 5.0]),
                Cell::magnitude(100.0, vec![40.0, 35.0, 25.0]),
            ],
        )
        .unwrap();
        let primary = classify(&table, &config);
        let reasons = primary[&CellCoord::new(0, 0)];
        assert!(reasons.contains(SuppressionReason::Frequency));
        assert!(reasons.contains(SuppressionReason::PPercent));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let table = Table::from_counts(3, 3, vec![1, 6, 7, 8, 2, 9, 10, 11, 3]).unwrap();
        let a = classify(&table, &config());
        let b = classify(&table, &config());
        assert_eq!(a, b);
    }
}
