//! 按权重随机抽取启用的端点。

use rand::Rng;
use rand::seq::IndexedRandom;

use super::models::EndpointRecord;

/// 从启用的记录中按权重抽取一个；权重为 0 的记录不会被抽中，
/// 但若全部启用记录权重都为 0，则退化为均匀抽取。
pub fn pick_random<'a, R: Rng>(
    records: &'a [EndpointRecord],
    rng: &mut R,
) -> Option<&'a EndpointRecord> {
    let enabled: Vec<&EndpointRecord> = records.iter().filter(|r| r.enabled).collect();
    if enabled.is_empty() {
        return None;
    }

    let total: u64 = enabled.iter().map(|r| u64::from(r.weight)).sum();
    if total == 0 {
        return enabled.choose(rng).copied();
    }

    let mut ticket = rng.random_range(0..total);
    for record in enabled.iter().copied() {
        let weight = u64::from(record.weight);
        if ticket < weight {
            return Some(record);
        }
        ticket -= weight;
    }
    enabled.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::models::ApiSource;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rec(name: &str, weight: u32, enabled: bool) -> EndpointRecord {
        EndpointRecord {
            name: name.to_string(),
            url: format!("https://{name}/img"),
            weight,
            description: String::new(),
            enabled,
            supports_params: false,
            params: String::new(),
            source: ApiSource::Recommended,
            line_number: 1,
        }
    }

    #[test]
    fn nothing_enabled_yields_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_random(&[], &mut rng).is_none());
        assert!(pick_random(&[rec("a", 100, false)], &mut rng).is_none());
    }

    #[test]
    fn draws_follow_the_weights() {
        let records = [rec("a", 10, true), rec("b", 90, true)];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let draws = 10_000;
        let mut a = 0usize;
        for _ in 0..draws {
            if pick_random(&records, &mut rng).unwrap().name == "a" {
                a += 1;
            }
        }
        let share = a as f64 / draws as f64;
        assert!((share - 0.10).abs() < 0.03, "share of a = {share}");
    }

    #[test]
    fn zero_weight_is_excluded_when_others_have_weight() {
        let records = [rec("zero", 0, true), rec("one", 1, true)];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert_eq!(pick_random(&records, &mut rng).unwrap().name, "one");
        }
    }

    #[test]
    fn all_zero_weights_fall_back_to_uniform() {
        let records = [rec("a", 0, true), rec("b", 0, true), rec("c", 0, false)];
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let picked = pick_random(&records, &mut rng).expect("uniform fallback");
            assert_ne!(picked.name, "c");
            seen.insert(picked.name.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn disabled_records_are_never_drawn() {
        let records = [rec("off", 99, false), rec("on", 1, true)];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            assert_eq!(pick_random(&records, &mut rng).unwrap().name, "on");
        }
    }
}
