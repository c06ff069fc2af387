//! ### Profile
//! Rebuilds the full planning horizon from representative periods by
//! replaying each pattern `reps` times in assembly order.

use crate::error::{ProfileError, ProfileResult};
use crate::table::{PatternTable, PeriodBlock, PeriodTable};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Label of every pattern occurrence, in assembly order.
///
/// The first occurrence of a name keeps it. The k-th occurrence becomes
/// `<name>_k`, skipping any candidate that is itself a pattern name or
/// was already handed out, so no two occurrences share a label.
pub fn assembled_labels(patterns: &PatternTable) -> Vec<String> {
    let reserved: HashSet<&str> = patterns.iter().map(|p| p.name.as_str()).collect();
    let mut emitted: HashSet<String> = HashSet::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    patterns
        .iter()
        .map(|pattern| {
            let count = seen.entry(pattern.name.as_str()).or_insert(0);
            *count += 1;
            let label = if *count == 1 {
                pattern.name.clone()
            } else {
                let mut k = *count;
                loop {
                    let candidate = format!("{}_{k}", pattern.name);
                    if !reserved.contains(candidate.as_str()) && !emitted.contains(&candidate) {
                        break candidate;
                    }
                    k += 1;
                }
            };
            emitted.insert(label.clone());
            label
        })
        .collect()
}

/// Concatenates every pattern's period, `reps` times each, under its
/// assembled label.
///
/// `step_width` is the number of base timesteps one row covers: 1 for raw
/// flows, `g` after [`granularise`](crate::compute::granularise). Steps
/// inside a period are shifted to start at 0 and repeat `k` is offset by
/// `k` period spans, where a span runs from the first step to one
/// `step_width` past the last. Offsets stay in base timesteps and never
/// overlap.
#[instrument(skip_all, fields(table = grouped.name(), patterns = patterns.len()))]
pub fn build_full_profile(
    grouped: &PeriodTable,
    patterns: &PatternTable,
    step_width: u32,
) -> ProfileResult<PeriodTable> {
    if step_width == 0 {
        return Err(ProfileError::InvalidGranularity {
            granularity: step_width,
        });
    }
    let mut out = PeriodTable::new(grouped.name(), grouped.columns().to_vec());

    for (pattern, label) in patterns.iter().zip(assembled_labels(patterns)) {
        let period = grouped.period(&pattern.name)?;
        let len = period.len();
        let reps = pattern.reps as usize;

        let first = period.steps.first().copied().unwrap_or(0);
        let last = period.steps.last().copied().unwrap_or(0);
        let span = u64::from(last - first) + u64::from(step_width);
        let steps = (0..u64::from(pattern.reps))
            .flat_map(|k| period.steps.iter().map(move |&s| u64::from(s - first) + k * span))
            .map(|offset| {
                u32::try_from(offset).map_err(|_| {
                    ProfileError::load(
                        grouped.name(),
                        format!("offset {offset} of `{label}` does not fit a timestep"),
                    )
                })
            })
            .collect::<ProfileResult<Vec<u32>>>()?;
        let rows = period
            .rows
            .iter()
            .cycle()
            .take(len * reps)
            .cloned()
            .collect();

        debug!(period = %pattern.name, %label, reps, len, span, "replayed period");
        out.push_block(PeriodBlock { label, steps, rows });
    }

    info!(rows = out.len(), "built full profile");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::granularise;
    use crate::table::Pattern;

    fn patterns(names: &[(&str, u32)]) -> PatternTable {
        PatternTable::new(
            names
                .iter()
                .enumerate()
                .map(|(i, (name, reps))| Pattern {
                    name: name.to_string(),
                    order: i as i64 + 1,
                    reps: *reps,
                    year: 2005,
                })
                .collect(),
        )
        .unwrap()
    }

    fn grouped() -> PeriodTable {
        PeriodTable::from_rows(
            "flows_by_w__name_elec_gb",
            vec!["Demand".into()],
            vec![
                ("Winter1".to_string(), 0, vec![10.]),
                ("Winter1".to_string(), 1, vec![-5.]),
                ("Summer1".to_string(), 0, vec![3.]),
                ("Summer1".to_string(), 1, vec![-1.]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn repeated_names_get_sequential_suffixes() {
        let labels = assembled_labels(&patterns(&[("A", 1), ("B", 1), ("A", 1), ("A", 1)]));
        assert_eq!(labels, ["A", "B", "A_2", "A_3"]);
    }

    #[test]
    fn suffix_skips_real_pattern_names() {
        let labels = assembled_labels(&patterns(&[("A", 1), ("A_2", 1), ("A", 1)]));
        assert_eq!(labels, ["A", "A_2", "A_3"]);
        let unique: HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[test]
    fn periods_replay_with_offsets() {
        let full = build_full_profile(&grouped(), &patterns(&[("Winter1", 2), ("Summer1", 1)]), 1)
            .unwrap();
        let winter = full.period("Winter1").unwrap();
        assert_eq!(winter.steps, [0, 1, 2, 3]);
        assert_eq!(winter.rows, [vec![10.], vec![-5.], vec![10.], vec![-5.]]);
        assert_eq!(full.period("Summer1").unwrap().steps, [0, 1]);
        assert_eq!(full.len(), 6);
    }

    #[test]
    fn second_occurrence_is_not_merged() {
        let full = build_full_profile(
            &grouped(),
            &patterns(&[("Winter1", 1), ("Summer1", 1), ("Winter1", 3)]),
            1,
        )
        .unwrap();
        let labels: Vec<_> = full.blocks().iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["Winter1", "Summer1", "Winter1_2"]);
        assert_eq!(full.period("Winter1_2").unwrap().len(), 6);
    }

    #[test]
    fn bucketed_periods_keep_base_timestep_offsets() {
        let hourly = PeriodTable::from_rows(
            "flows_by_w__name_elec_gb",
            vec!["Demand".into()],
            (0..336).map(|s| ("Winter1".to_string(), s, vec![if s < 168 { 1. } else { 3. }])),
        )
        .unwrap();
        let weekly = granularise(&hourly, 168).unwrap();
        let full = build_full_profile(&weekly, &patterns(&[("Winter1", 2)]), 168).unwrap();

        let winter = full.period("Winter1").unwrap();
        assert_eq!(winter.steps, [0, 168, 336, 504]);
        assert_eq!(winter.rows, [vec![1.], vec![3.], vec![1.], vec![3.]]);
    }

    #[test]
    fn zero_step_width_is_rejected() {
        assert!(matches!(
            build_full_profile(&grouped(), &patterns(&[("Winter1", 1)]), 0),
            Err(ProfileError::InvalidGranularity { granularity: 0 })
        ));
    }

    #[test]
    fn pattern_without_rows_is_missing_period() {
        match build_full_profile(&grouped(), &patterns(&[("Spring1", 1)]), 1) {
            Err(ProfileError::MissingPeriod { period, .. }) => assert_eq!(period, "Spring1"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
