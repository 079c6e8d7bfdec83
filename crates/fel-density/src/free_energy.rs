//! Free energies as a density proxy.

/// Derives per-frame free energies from neighbor populations.
///
/// `F[i] = -ln(pop[i] / max_pop)`, so the most populated frame sits at zero
/// and sparser frames climb. Only the ordering matters downstream: lower
/// free energy means denser.
pub fn free_energies(populations: &[usize]) -> Vec<f32> {
    let max_pop = populations.iter().copied().max().unwrap_or(1).max(1) as f32;
    populations
        .iter()
        .map(|&p| -((p.max(1) as f32 / max_pop).ln()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_densest_frame_is_at_zero() {
        let fe = free_energies(&[4, 2, 1]);
        assert_eq!(fe[0], 0.0);
        assert!(fe[1] > 0.0);
        assert!(fe[2] > fe[1]);
        assert!((fe[2] - (4.0f32).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_order_is_inverted() {
        let pops = [10usize, 3, 7, 10];
        let fe = free_energies(&pops);
        for i in 0..pops.len() {
            for j in 0..pops.len() {
                if pops[i] > pops[j] {
                    assert!(fe[i] < fe[j]);
                }
            }
        }
        assert_eq!(fe[0], fe[3]);
    }
}
