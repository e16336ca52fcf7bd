//! Layered tie-break scoring across preemption candidates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::error;

use reef_core::{Victims, Workload};

use crate::strategy::ScoreFn;

/// Earliest start time among the highest-priority victims, or `None` when no
/// highest-priority victim carries a start time.
fn earliest_start_of_highest_priority(victims: &Victims) -> Option<DateTime<Utc>> {
    let highest = victims.pods.iter().map(|p| p.priority).max()?;
    victims
        .pods
        .iter()
        .filter(|p| p.priority == highest)
        .filter_map(|p| p.start_time)
        .min()
}

fn highest_victim_priority(victims: &Victims) -> i64 {
    victims
        .pods
        .first()
        .map_or(i64::MIN, |p| i64::from(p.priority))
}

fn sum_shifted_priorities(victims: &Victims) -> i64 {
    // Priorities are shifted so every term is non-negative; a node with a
    // few negative-priority victims must not beat a node with fewer victims
    // of the same priority.
    victims
        .pods
        .iter()
        .map(|p: &Workload| i64::from(p.priority) + i64::from(i32::MAX) + 1)
        .sum()
}

/// The default layered criteria, in order of precedence. Each is a maximize
/// score; ties pass to the next.
fn default_score_funcs(victims_map: &BTreeMap<String, Victims>) -> Vec<ScoreFn<'_>> {
    vec![
        // Fewest disruption-budget violations.
        Box::new(move |node| {
            victims_map.get(node).map_or(i64::MIN, |v| {
                -(i64::try_from(v.num_pdb_violations).unwrap_or(i64::MAX))
            })
        }),
        // Lowest highest-victim priority.
        Box::new(move |node| {
            victims_map
                .get(node)
                .map_or(i64::MIN, |v| -highest_victim_priority(v))
        }),
        // Smallest sum of victim priorities.
        Box::new(move |node| {
            victims_map
                .get(node)
                .map_or(i64::MIN, |v| -sum_shifted_priorities(v))
        }),
        // Fewest victims.
        Box::new(move |node| {
            victims_map
                .get(node)
                .map_or(i64::MIN, |v| -(v.pods.len() as i64))
        }),
        // Latest earliest start time among highest-priority victims.
        Box::new(move |node| {
            let Some(earliest) = victims_map.get(node).and_then(earliest_start_of_highest_priority)
            else {
                error!(node, "no start time among highest-priority victims");
                return i64::MIN;
            };
            earliest.timestamp_nanos_opt().unwrap_or(i64::MIN)
        }),
    ]
}

/// Chooses one node among the candidates.
///
/// With no explicit score functions, the default layered criteria apply.
/// After each criterion only the tied maximum is retained; when exactly one
/// node remains it wins. The final fallback is the first node in sorted name
/// order, which makes the result deterministic for a fixed victims map.
#[must_use]
pub fn pick_one_node(
    victims_map: &BTreeMap<String, Victims>,
    score_funcs: Option<Vec<ScoreFn<'_>>>,
) -> Option<String> {
    if victims_map.is_empty() {
        return None;
    }

    let mut candidates: Vec<String> = victims_map.keys().cloned().collect();
    let funcs = score_funcs.unwrap_or_else(|| default_score_funcs(victims_map));

    for f in &funcs {
        let mut max_score = i64::MIN;
        let mut selected = Vec::new();
        for node in &candidates {
            let score = f(node);
            if score > max_score {
                max_score = score;
                selected.clear();
            }
            if score == max_score {
                selected.push(node.clone());
            }
        }
        if selected.len() == 1 {
            return selected.pop();
        }
        candidates = selected;
    }

    candidates.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reef_core::Workload;

    fn victim(name: &str, priority: i32) -> Workload {
        Workload::new("training", name).with_priority(priority)
    }

    fn victims(pods: Vec<Workload>, violations: u64) -> Victims {
        Victims {
            pods,
            num_pdb_violations: violations,
        }
    }

    #[test]
    fn empty_map_yields_none() {
        assert_eq!(pick_one_node(&BTreeMap::new(), None), None);
    }

    #[test]
    fn single_candidate_wins() {
        let mut map = BTreeMap::new();
        map.insert("n1".to_string(), victims(vec![victim("a", 1)], 0));
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("n1"));
    }

    #[test]
    fn fewest_pdb_violations_wins_first() {
        let mut map = BTreeMap::new();
        map.insert("violating".to_string(), victims(vec![victim("a", 1)], 2));
        map.insert("clean".to_string(), victims(vec![victim("b", 100)], 0));
        // The clean node wins despite a higher-priority victim.
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("clean"));
    }

    #[test]
    fn lowest_highest_priority_breaks_ties() {
        let mut map = BTreeMap::new();
        map.insert("high".to_string(), victims(vec![victim("a", 100)], 0));
        map.insert("low".to_string(), victims(vec![victim("b", 10)], 0));
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("low"));
    }

    #[test]
    fn smallest_priority_sum_breaks_ties() {
        let mut map = BTreeMap::new();
        map.insert(
            "two".to_string(),
            victims(vec![victim("a", 10), victim("b", 5)], 0),
        );
        map.insert("one".to_string(), victims(vec![victim("c", 10)], 0),
        );
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("one"));
    }

    #[test]
    fn negative_priorities_do_not_outweigh_fewer_victims() {
        // With the shift, two victims of priority -5 sum higher than a
        // single victim of priority -5.
        let mut map = BTreeMap::new();
        map.insert(
            "two".to_string(),
            victims(vec![victim("a", -5), victim("b", -5)], 0),
        );
        map.insert("one".to_string(), victims(vec![victim("c", -5)], 0));
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("one"));
    }

    #[test]
    fn latest_earliest_start_time_breaks_ties() {
        let mut map = BTreeMap::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).single();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).single();
        let mut early = victim("a", 10);
        early.start_time = t1;
        let mut late = victim("b", 10);
        late.start_time = t2;
        map.insert("early".to_string(), victims(vec![early], 0));
        map.insert("late".to_string(), victims(vec![late], 0));
        // Latest earliest-start-time wins.
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("late"));
    }

    #[test]
    fn missing_start_time_scores_minimum() {
        let mut map = BTreeMap::new();
        let mut with_time = victim("a", 10);
        with_time.start_time = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single();
        map.insert("timed".to_string(), victims(vec![with_time], 0));
        map.insert("untimed".to_string(), victims(vec![victim("b", 10)], 0));
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("timed"));
    }

    #[test]
    fn full_tie_falls_back_to_sorted_name_order() {
        let mut map = BTreeMap::new();
        map.insert("zeta".to_string(), victims(vec![victim("a", 10)], 0));
        map.insert("alpha".to_string(), victims(vec![victim("b", 10)], 0));
        assert_eq!(pick_one_node(&map, None).as_deref(), Some("alpha"));
    }

    #[test]
    fn scorer_is_deterministic() {
        let mut map = BTreeMap::new();
        map.insert(
            "n1".to_string(),
            victims(vec![victim("a", 10), victim("b", 3)], 0),
        );
        map.insert("n2".to_string(), victims(vec![victim("c", 10)], 1));
        map.insert("n3".to_string(), victims(vec![victim("d", 50)], 0));

        let first = pick_one_node(&map, None);
        for _ in 0..20 {
            assert_eq!(pick_one_node(&map, None), first);
        }
    }

    #[test]
    fn explicit_score_funcs_take_precedence() {
        let mut map = BTreeMap::new();
        map.insert("n1".to_string(), victims(vec![victim("a", 1)], 5));
        map.insert("n2".to_string(), victims(vec![victim("b", 1)], 0));

        // Prefer MORE violations, inverting the default.
        let funcs: Vec<ScoreFn<'_>> = vec![Box::new(|node: &str| {
            if node == "n1" {
                100
            } else {
                0
            }
        })];
        assert_eq!(pick_one_node(&map, Some(funcs)).as_deref(), Some("n1"));
    }
}
