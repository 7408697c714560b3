use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;
use crate::models::round_half_up;

pub const DEFAULT_TIE_PRECISION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub student_id: String,
    pub value: Option<Decimal>,
    pub rank: Option<u32>,
    pub percentile: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    /// Ranked students first in rank order, then unranked ones in input order.
    pub entries: Vec<RankedEntry>,
    pub class_size: usize,
    pub eligible: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingEngine {
    tie_precision: u32,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TIE_PRECISION)
    }
}

impl RankingEngine {
    pub fn new(tie_precision: u32) -> Self {
        Self { tie_precision }
    }

    /// Standard competition ranking, highest value first.
    ///
    /// Students without a value are kept in `class_size` but get no rank.
    pub fn rank(&self, values: &[(String, Option<Decimal>)]) -> Result<Ranking, EngineError> {
        let mut seen = HashSet::new();
        for (student_id, _) in values {
            if !seen.insert(student_id.as_str()) {
                return Err(EngineError::DuplicateStudent(student_id.clone()));
            }
        }

        let mut eligible: Vec<(&String, Decimal, Decimal)> = values
            .iter()
            .filter_map(|(id, value)| {
                value.map(|v| (id, v, round_half_up(v, self.tie_precision)))
            })
            .collect();
        // sort_by is stable, so equal keys keep input order.
        eligible.sort_by(|a, b| b.2.cmp(&a.2));

        let total = eligible.len();
        let mut entries = Vec::with_capacity(values.len());
        let mut previous: Option<(Decimal, u32)> = None;

        for (position, (student_id, value, key)) in eligible.into_iter().enumerate() {
            let rank = match previous {
                Some((prev_key, prev_rank)) if prev_key == key => prev_rank,
                _ => position as u32 + 1,
            };
            previous = Some((key, rank));

            let at_or_below = Decimal::from(total as u32 - rank + 1);
            entries.push(RankedEntry {
                student_id: student_id.clone(),
                value: Some(value),
                rank: Some(rank),
                percentile: Some(round_half_up(
                    at_or_below / Decimal::from(total as u32) * Decimal::ONE_HUNDRED,
                    1,
                )),
            });
        }

        entries.extend(
            values
                .iter()
                .filter(|(_, value)| value.is_none())
                .map(|(student_id, _)| RankedEntry {
                    student_id: student_id.clone(),
                    value: None,
                    rank: None,
                    percentile: None,
                }),
        );

        Ok(Ranking {
            entries,
            class_size: values.len(),
            eligible: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(values: &[(&str, Option<Decimal>)]) -> Vec<(String, Option<Decimal>)> {
        values.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    fn rank_of(ranking: &Ranking, student: &str) -> Option<u32> {
        ranking
            .entries
            .iter()
            .find(|e| e.student_id == student)
            .and_then(|e| e.rank)
    }

    #[test]
    fn ties_share_a_rank_and_skip_the_next() {
        let ranking = RankingEngine::default()
            .rank(&input(&[("a", Some(dec!(95))), ("b", Some(dec!(95))), ("c", Some(dec!(80)))]))
            .unwrap();

        let ranks: Vec<Option<u32>> = ranking.entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![Some(1), Some(1), Some(3)]);
        let ids: Vec<&str> = ranking.entries.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn ties_compare_at_two_decimals() {
        let ranking = RankingEngine::default()
            .rank(&input(&[
                ("a", Some(dec!(88.004))),
                ("b", Some(dec!(88.001))),
                ("c", Some(dec!(88.01))),
            ]))
            .unwrap();

        assert_eq!(rank_of(&ranking, "c"), Some(1));
        assert_eq!(rank_of(&ranking, "a"), Some(2));
        assert_eq!(rank_of(&ranking, "b"), Some(2));
    }

    #[test]
    fn attendance_rates_rank_descending() {
        let ranking = RankingEngine::default()
            .rank(&input(&[("s1", Some(dec!(90))), ("s2", Some(dec!(100))), ("s3", Some(dec!(75)))]))
            .unwrap();

        assert_eq!(rank_of(&ranking, "s1"), Some(2));
        assert_eq!(rank_of(&ranking, "s2"), Some(1));
        assert_eq!(rank_of(&ranking, "s3"), Some(3));
    }

    #[test]
    fn students_without_grades_count_in_class_size_only() {
        let ranking = RankingEngine::default()
            .rank(&input(&[("a", None), ("b", Some(dec!(70))), ("c", Some(dec!(60)))]))
            .unwrap();

        assert_eq!(ranking.class_size, 3);
        assert_eq!(ranking.eligible, 2);
        assert_eq!(ranking.entries.last().map(|e| e.student_id.as_str()), Some("a"));
        assert_eq!(rank_of(&ranking, "a"), None);
        assert_eq!(ranking.entries[0].percentile, Some(dec!(100.0)));
        assert_eq!(ranking.entries[1].percentile, Some(dec!(50.0)));
    }

    #[test]
    fn duplicate_students_are_rejected() {
        let err = RankingEngine::default()
            .rank(&input(&[("a", Some(dec!(70))), ("a", Some(dec!(60)))]))
            .unwrap_err();
        assert_eq!(err, EngineError::DuplicateStudent("a".to_string()));
    }

    #[test]
    fn empty_input_ranks_nobody() {
        let ranking = RankingEngine::default().rank(&[]).unwrap();
        assert!(ranking.entries.is_empty());
        assert_eq!(ranking.class_size, 0);
    }
}
