// IV rank: percentile of today's implied volatility within the trailing
// 90-day daily-sample window for the same underlying/option class.

use crate::error::EngineError;

pub const MIN_SAMPLES: usize = 20;

/// `history` holds daily IV samples from the trailing 90 calendar days
/// (not including today). Fewer than 20 samples is an error — strategy
/// callers must treat that as "no signal".
pub fn percentile_rank(symbol: &str, today_iv: f64, history: &[f64]) -> Result<f64, EngineError> {
    if history.len() < MIN_SAMPLES {
        return Err(EngineError::IVHistoryInsufficient {
            symbol: symbol.to_string(),
            samples: history.len(),
        });
    }

    let at_or_below = history.iter().filter(|&&iv| iv <= today_iv).count();
    Ok(at_or_below as f64 / history.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_history() {
        let history = vec![0.3; 19];
        assert!(percentile_rank("SPY", 0.3, &history).is_err());
    }

    #[test]
    fn rank_one_when_today_is_the_max() {
        let history: Vec<f64> = (1..=30).map(|i| i as f64 * 0.01).collect();
        let rank = percentile_rank("SPY", 0.30, &history).unwrap();
        assert!((rank - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rank_near_zero_when_today_is_the_min() {
        let history: Vec<f64> = (1..=30).map(|i| i as f64 * 0.01 + 0.01).collect();
        let rank = percentile_rank("SPY", 0.005, &history).unwrap();
        assert!(rank < 0.05);
    }

    #[test]
    fn rank_is_bounded() {
        let history: Vec<f64> = (1..=90).map(|i| (i as f64 * 0.007).sin().abs() + 0.1).collect();
        for sample in &history {
            let rank = percentile_rank("SPY", *sample, &history).unwrap();
            assert!((0.0..=1.0).contains(&rank));
        }
    }
}
