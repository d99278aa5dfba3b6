use shared::{CLASS_LABELS, Label, PredictionResult};

use super::model::RawPrediction;

/// A sigmoid output strictly below this value is reported as infected.
pub const INFECTED_THRESHOLD: f32 = 0.3;

/// Maps model output to a label.
///
/// Sigmoid head: `p < 0.3` is "Infected", anything else "Not Infected", and
/// the reported confidence is `p` itself for both labels.
/// Softmax head: the label at the arg-max index of [`CLASS_LABELS`] (first
/// maximum on ties), with the maximum value as confidence.
pub fn interpret(raw: &RawPrediction) -> PredictionResult {
    let values = raw.values();

    if raw.trailing_dim() == 1 {
        let p = values[0];
        let label = if p < INFECTED_THRESHOLD {
            Label::Infected
        } else {
            Label::NotInfected
        };
        return PredictionResult::new(label, p);
    }

    let (index, max) = values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 { (i, v) } else { best }
        });
    PredictionResult::new(CLASS_LABELS[index], max)
}
