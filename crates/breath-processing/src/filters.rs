//! Butterworth filter design and stateful IIR filtering
//!
//! Coefficients are designed as zeros/poles/gain on the analog prototype,
//! mapped to high-pass or band-pass, bilinear-transformed and expanded to a
//! transfer function `(b, a)`. Filtering runs the direct-form II transposed
//! recurrence with an explicit [`FilterState`], so streaming callers carry
//! state across batch boundaries.

use breath_core::{invalid_parameter, BreathError, BreathResult};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Filter families supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    /// Butterworth highpass filter
    ButterworthHighpass,
    /// Butterworth bandpass filter
    ButterworthBandpass,
}

/// Cutoff frequencies in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cutoff {
    /// Single corner for highpass
    Single(f64),
    /// `(low, high)` corners for bandpass
    Band(f64, f64),
}

/// Filter design request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter type
    pub filter_type: FilterType,
    /// Prototype order
    pub order: usize,
    /// Cutoff frequency (Hz)
    pub cutoff: Cutoff,
}

impl FilterConfig {
    /// Create highpass filter configuration
    pub fn highpass(cutoff_hz: f64, order: usize) -> Self {
        Self {
            filter_type: FilterType::ButterworthHighpass,
            order,
            cutoff: Cutoff::Single(cutoff_hz),
        }
    }

    /// Create bandpass filter configuration
    pub fn bandpass(low_hz: f64, high_hz: f64, order: usize) -> Self {
        Self {
            filter_type: FilterType::ButterworthBandpass,
            order,
            cutoff: Cutoff::Band(low_hz, high_hz),
        }
    }

    /// Design coefficients for a sampling rate
    pub fn design(&self, sampling_rate: f64) -> BreathResult<FilterCoefficients> {
        design(self.filter_type, self.cutoff, sampling_rate, self.order)
    }
}

/// Transfer function coefficients, normalized so `a[0] == 1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCoefficients {
    numerator: Vec<f64>,
    denominator: Vec<f64>,
    /// Response to a unit constant input once settled
    dc_gain: f64,
}

impl FilterCoefficients {
    /// Build from raw `(b, a)`; the shorter side is zero-padded.
    pub fn new(mut numerator: Vec<f64>, mut denominator: Vec<f64>) -> BreathResult<Self> {
        if numerator.is_empty() || denominator.is_empty() {
            return Err(invalid_parameter!("coefficient vectors must not be empty"));
        }
        if numerator.iter().chain(denominator.iter()).any(|c| !c.is_finite()) {
            return Err(invalid_parameter!("coefficients must be finite"));
        }
        let a0 = denominator[0];
        if a0 == 0.0 {
            return Err(invalid_parameter!("leading denominator coefficient must be non-zero"));
        }

        let len = numerator.len().max(denominator.len());
        numerator.resize(len, 0.0);
        denominator.resize(len, 0.0);
        numerator.iter_mut().for_each(|c| *c /= a0);
        denominator.iter_mut().for_each(|c| *c /= a0);

        let pole_sum: f64 = denominator.iter().sum();
        if pole_sum == 0.0 {
            return Err(invalid_parameter!("filter has a pole at DC; no steady state exists"));
        }
        let dc_gain = numerator.iter().sum::<f64>() / pole_sum;

        Ok(Self {
            numerator,
            denominator,
            dc_gain,
        })
    }

    pub fn numerator(&self) -> &[f64] {
        &self.numerator
    }

    pub fn denominator(&self) -> &[f64] {
        &self.denominator
    }

    /// Transfer-function order; also the length of the matching [`FilterState`]
    pub fn order(&self) -> usize {
        self.denominator.len() - 1
    }

    pub fn dc_gain(&self) -> f64 {
        self.dc_gain
    }
}

/// Delay-line values of one filter stage on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterState(Vec<f64>);

impl FilterState {
    /// All-zero state for a filter of the given order
    pub fn zeros(order: usize) -> Self {
        Self(vec![0.0; order])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// State scaled by a constant, e.g. the unit steady state times the first sample
    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|z| z * factor).collect())
    }
}

impl From<Vec<f64>> for FilterState {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Design Butterworth coefficients.
///
/// Highpass takes [`Cutoff::Single`], bandpass takes [`Cutoff::Band`]; every
/// corner must satisfy `0 < f < sampling_rate / 2`, band corners must be
/// strictly increasing.
pub fn design(
    filter_type: FilterType,
    cutoff: Cutoff,
    sampling_rate: f64,
    order: usize,
) -> BreathResult<FilterCoefficients> {
    if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Err(invalid_parameter!("sampling rate must be positive, got {}", sampling_rate));
    }
    if order == 0 {
        return Err(invalid_parameter!("filter order must be at least 1"));
    }
    let nyquist = sampling_rate / 2.0;
    let check = |f: f64| -> BreathResult<f64> {
        if f.is_finite() && f > 0.0 && f < nyquist {
            Ok(f)
        } else {
            Err(invalid_parameter!(
                "cutoff {} Hz must satisfy 0 < f < nyquist ({} Hz)",
                f,
                nyquist
            ))
        }
    };

    let prototype = butterworth_prototype(order);
    let (zeros, poles, gain) = match (filter_type, cutoff) {
        (FilterType::ButterworthHighpass, Cutoff::Single(f)) => {
            highpass_transform(&prototype, prewarp(check(f)? / nyquist))
        }
        (FilterType::ButterworthBandpass, Cutoff::Band(low, high)) => {
            let (low, high) = (check(low)?, check(high)?);
            if low >= high {
                return Err(invalid_parameter!(
                    "band corners must increase, got {} Hz >= {} Hz",
                    low,
                    high
                ));
            }
            bandpass_transform(
                &prototype,
                prewarp(low / nyquist),
                prewarp(high / nyquist),
            )
        }
        (filter_type, cutoff) => {
            return Err(invalid_parameter!(
                "{:?} cannot use cutoff {:?}",
                filter_type,
                cutoff
            ));
        }
    };

    let (zeros, poles, gain) = bilinear(&zeros, &poles, gain);

    let numerator = expand_polynomial(&zeros).into_iter().map(|c| c * gain).collect();
    let denominator = expand_polynomial(&poles);

    let one = Complex64::new(1.0, 0.0);
    let dc = product(zeros.iter().map(|z| one - z)) / product(poles.iter().map(|p| one - p));

    Ok(FilterCoefficients {
        numerator,
        denominator,
        dc_gain: gain * dc.re,
    })
}

/// Steady state for a unit constant input.
///
/// Scaling it by a constant `c` makes the filter output `c * dc_gain` from
/// the first sample on.
pub fn initial_state(coefficients: &FilterCoefficients) -> FilterState {
    let b = coefficients.numerator();
    let a = coefficients.denominator();
    let gain = coefficients.dc_gain();
    let order = coefficients.order();

    let zi = (0..order)
        .map(|i| ((i + 1)..=order).map(|k| b[k] - a[k] * gain).sum())
        .collect();
    FilterState(zi)
}

/// Filter a whole array, starting from `state` or from rest
pub fn apply_batch(
    samples: &[f64],
    coefficients: &FilterCoefficients,
    state: Option<&FilterState>,
) -> BreathResult<Vec<f64>> {
    let mut z = match state {
        Some(state) => {
            check_state(coefficients, state)?;
            state.0.clone()
        }
        None => vec![0.0; coefficients.order()],
    };

    Ok(samples
        .iter()
        .map(|&x| step(coefficients, &mut z, x))
        .collect())
}

/// Filter one sample and hand back the updated state
pub fn apply_sample(
    sample: f64,
    coefficients: &FilterCoefficients,
    mut state: FilterState,
) -> BreathResult<(f64, FilterState)> {
    check_state(coefficients, &state)?;
    let y = step(coefficients, &mut state.0, sample);
    Ok((y, state))
}

/// Streaming filter stage for one channel.
///
/// The state is primed from the first sample so a sensor offset does not
/// ring through the filter.
#[derive(Debug, Clone)]
pub struct FilterStage {
    coefficients: Arc<FilterCoefficients>,
    unit_state: FilterState,
    state: Option<FilterState>,
}

impl FilterStage {
    pub fn new(coefficients: Arc<FilterCoefficients>) -> Self {
        let unit_state = initial_state(&coefficients);
        Self {
            coefficients,
            unit_state,
            state: None,
        }
    }

    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.coefficients
    }

    /// Current state, `None` until the first sample
    pub fn state(&self) -> Option<&FilterState> {
        self.state.as_ref()
    }

    pub fn is_primed(&self) -> bool {
        self.state.is_some()
    }

    /// Filter one sample
    pub fn process(&mut self, x: f64) -> f64 {
        let unit_state = &self.unit_state;
        let state = self.state.get_or_insert_with(|| unit_state.scaled(x));
        step(&self.coefficients, &mut state.0, x)
    }

    /// Filter samples in order, carrying state
    pub fn process_batch(&mut self, samples: &[f64]) -> Vec<f64> {
        samples.iter().map(|&x| self.process(x)).collect()
    }

    /// Forget the carried state; the next sample primes again
    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Stages applied in sequence, e.g. highpass then bandpass
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new(coefficients: &[Arc<FilterCoefficients>]) -> Self {
        Self {
            stages: coefficients.iter().cloned().map(FilterStage::new).collect(),
        }
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn process(&mut self, x: f64) -> f64 {
        self.stages.iter_mut().fold(x, |acc, stage| stage.process(acc))
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(FilterStage::reset);
    }
}

fn check_state(coefficients: &FilterCoefficients, state: &FilterState) -> BreathResult<()> {
    if state.len() != coefficients.order() {
        return Err(BreathError::InvalidParameter {
            reason: format!(
                "filter state has {} values but filter order is {}",
                state.len(),
                coefficients.order()
            ),
        });
    }
    Ok(())
}

/// Direct-form II transposed update; `z` must hold `order` values.
fn step(coefficients: &FilterCoefficients, z: &mut [f64], x: f64) -> f64 {
    let b = &coefficients.numerator;
    let a = &coefficients.denominator;
    let n = z.len();
    if n == 0 {
        return b[0] * x;
    }

    let y = b[0] * x + z[0];
    for i in 0..n - 1 {
        z[i] = b[i + 1] * x - a[i + 1] * y + z[i + 1];
    }
    z[n - 1] = b[n] * x - a[n] * y;
    y
}

/// Analog lowpass prototype poles on the unit circle, unity gain
fn butterworth_prototype(order: usize) -> Vec<Complex64> {
    let n = order as f64;
    (0..order)
        .map(|i| {
            let m = 2.0 * i as f64 - n + 1.0;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect()
}

/// Map a normalized digital frequency (1.0 = nyquist) to the analog domain
fn prewarp(normalized: f64) -> f64 {
    4.0 * (PI * normalized / 2.0).tan()
}

type Zpk = (Vec<Complex64>, Vec<Complex64>, f64);

fn highpass_transform(poles: &[Complex64], wo: f64) -> Zpk {
    let gain = (Complex64::new(1.0, 0.0) / product(poles.iter().map(|p| -p))).re;
    let wo = Complex64::new(wo, 0.0);
    let poles = poles.iter().map(|p| wo / p).collect::<Vec<_>>();
    let zeros = vec![Complex64::new(0.0, 0.0); poles.len()];
    (zeros, poles, gain)
}

fn bandpass_transform(poles: &[Complex64], w1: f64, w2: f64) -> Zpk {
    let bw = w2 - w1;
    let wo2 = w1 * w2;

    let scaled: Vec<Complex64> = poles.iter().map(|&p| p * (bw / 2.0)).collect();
    let upper = scaled.iter().map(|&p| p + (p * p - wo2).sqrt());
    let lower = scaled.iter().map(|&p| p - (p * p - wo2).sqrt());
    let poles: Vec<Complex64> = upper.chain(lower).collect();

    let zeros = vec![Complex64::new(0.0, 0.0); scaled.len()];
    let gain = bw.powi(scaled.len() as i32);
    (zeros, poles, gain)
}

/// Bilinear transform with the design rate fixed at 2 (so `2 * fs == 4`)
fn bilinear(zeros: &[Complex64], poles: &[Complex64], gain: f64) -> Zpk {
    let fs2 = Complex64::new(4.0, 0.0);
    let map = |s: &Complex64| (fs2 + s) / (fs2 - s);

    let mut digital_zeros: Vec<Complex64> = zeros.iter().map(map).collect();
    let digital_poles: Vec<Complex64> = poles.iter().map(map).collect();
    digital_zeros.resize(digital_poles.len(), Complex64::new(-1.0, 0.0));

    let gain = gain
        * (product(zeros.iter().map(|z| fs2 - z)) / product(poles.iter().map(|p| fs2 - p))).re;
    (digital_zeros, digital_poles, gain)
}

/// Monic polynomial with the given roots, highest power first. Roots come
/// in conjugate pairs so only real parts are kept.
fn expand_polynomial(roots: &[Complex64]) -> Vec<f64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += *c;
            next[i + 1] -= *c * *root;
        }
        coeffs = next;
    }
    coeffs.into_iter().map(|c| c.re).collect()
}

fn product(values: impl Iterator<Item = Complex64>) -> Complex64 {
    values.fold(Complex64::new(1.0, 0.0), |acc, v| acc * v)
}
