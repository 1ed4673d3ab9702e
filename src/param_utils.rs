use std::collections::HashMap;

/// Extract a parameter as f64 with a default value
pub fn get_param_f64(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

/// Extract a parameter as f64, clamped to a range with finite checks
pub fn get_param_f64_clamped(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> f64 {
    let raw = params.get(key).copied().unwrap_or(default);
    if !raw.is_finite() {
        return default;
    }
    raw.clamp(min, max)
}

/// Get a parameter as usize with a minimum value
pub fn get_usize_param_min(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
    min: usize,
) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(min as f64) as usize)
        .unwrap_or(default)
}

/// Get a finite parameter value, returns None if not found or not finite
pub fn finite_param(params: &HashMap<String, f64>, key: &str) -> Option<f64> {
    params.get(key).copied().filter(|v| v.is_finite())
}

/// Stable textual key for a parameter map, used for dedup and logging
pub fn parameter_signature(parameters: &HashMap<String, f64>) -> String {
    let mut sorted: Vec<_> = parameters.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    format!("{:?}", sorted)
}
