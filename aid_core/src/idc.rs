//! Insulin decay curves.
//!
//! `remaining(t)` is the fraction of a unit of insulin still active `t` hours
//! after delivery; `integral(t)` is its antiderivative with `integral(0) = 0`.
//! Both are clamped outside `[0, DIA]`: before delivery nothing has decayed,
//! after DIA nothing remains.

use crate::error::{AidError, Result};

/// Published 4th-order Walsh fits, in minutes and percent, ascending powers.
const WALSH_COEFFS: [(u8, [f64; 5]); 4] = [
    (3, [99.951, 9.255e-2, -1.759e-2, 1.354e-4, -3.203e-7]),
    (4, [99.95, -9.086e-2, -5.51e-3, 2.53e-5, -3.31e-8]),
    (5, [99.3, 4.49e-2, -5.55e-3, 2.32e-5, -2.95e-8]),
    (6, [99.7, 6.365e-2, -4.095e-3, 1.413e-5, -1.493e-8]),
];

/// Activity peak of rapid-acting analogues (h).
pub const RAPID_ACTING_PEAK_H: f64 = 75.0 / 60.0;
/// Activity peak of ultra-rapid analogues (h).
pub const ULTRA_RAPID_PEAK_H: f64 = 55.0 / 60.0;

#[inline]
fn horner(c: &[f64; 5], t: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &k| acc.mul_add(t, k))
}

/// Walsh polynomial, rescaled to hours and normalized so that the curve
/// starts at exactly 1 and ends at 0 on DIA.
///
/// Some fits rise slightly above 1 right after delivery. That stretch is
/// clamped to 1 in both `remaining` and `integral`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalshCurve {
    dia: f64,
    f: [f64; 5],
    // coefficients of t^1..t^5 in the antiderivative
    big_f: [f64; 5],
    // end of the initial stretch where the polynomial exceeds 1
    overshoot_h: f64,
}

impl WalshCurve {
    pub fn new(dia: f64) -> Result<Self> {
        let Some((_, raw)) = WALSH_COEFFS
            .iter()
            .find(|(d, _)| (f64::from(*d) - dia).abs() < 1e-9)
        else {
            return Err(AidError::UnsupportedDia(dia).into());
        };
        let mut hours = [0.0; 5];
        let mut scale = 1.0;
        for (h, &c) in hours.iter_mut().zip(raw.iter()) {
            *h = c * scale / 100.0;
            scale *= 60.0;
        }
        let at_dia = horner(&hours, dia);
        let span = hours[0] - at_dia;
        // f(t) = (p(t) - p(dia)) / (p(0) - p(dia))
        let mut f = hours.map(|c| c / span);
        f[0] = 1.0;
        let mut big_f = [0.0; 5];
        let mut div = 1.0;
        for (b, &a) in big_f.iter_mut().zip(f.iter()) {
            *b = a / div;
            div += 1.0;
        }
        let overshoot_h = overshoot_end(&f, dia);
        Ok(Self {
            dia,
            f,
            big_f,
            overshoot_h,
        })
    }

    fn remaining(&self, t: f64) -> f64 {
        horner(&self.f, t)
    }

    fn poly_integral(&self, t: f64) -> f64 {
        t * horner(&self.big_f, t)
    }

    fn integral(&self, t: f64) -> f64 {
        let t0 = self.overshoot_h;
        if t <= t0 {
            return t;
        }
        t0 + self.poly_integral(t) - self.poly_integral(t0)
    }
}

/// First root in `(0, dia]` of `f(t) - 1`, or 0 when the curve starts
/// falling. `f(t) - 1 = t * g(t)` with `g` the cubic below.
fn overshoot_end(f: &[f64; 5], dia: f64) -> f64 {
    const SCAN: u32 = 1000;
    let g = |t: f64| f[4].mul_add(t, f[3]).mul_add(t, f[2]).mul_add(t, f[1]);
    if g(0.0) <= 0.0 {
        return 0.0;
    }
    let mut lo = 0.0;
    for k in 1..=SCAN {
        let hi = dia * f64::from(k) / f64::from(SCAN);
        if g(hi) <= 0.0 {
            let (mut a, mut b) = (lo, hi);
            for _ in 0..60 {
                let m = 0.5 * (a + b);
                if g(m) > 0.0 {
                    a = m;
                } else {
                    b = m;
                }
            }
            return b;
        }
        lo = hi;
    }
    dia
}

/// Exponential activity model parametrized by DIA and activity peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialCurve {
    dia: f64,
    peak: f64,
    tau: f64,
    a: f64,
    s: f64,
}

impl ExponentialCurve {
    pub fn new(dia: f64, peak: f64) -> Result<Self> {
        if !(dia > 0.0 && dia.is_finite()) {
            return Err(AidError::Config(format!("DIA must be > 0, got {dia}")).into());
        }
        if !(peak > 0.0 && peak < dia / 2.0) {
            return Err(AidError::Config(format!(
                "insulin peak {peak} h must lie in (0, DIA/2)"
            ))
            .into());
        }
        let r = peak / dia;
        let tau = peak * (1.0 - r) / (1.0 - 2.0 * r);
        let a = 2.0 * tau / dia;
        let s = 1.0 / (1.0 - a + (1.0 + a) * (-dia / tau).exp());
        Ok(Self {
            dia,
            peak,
            tau,
            a,
            s,
        })
    }

    #[must_use]
    pub const fn peak(&self) -> f64 {
        self.peak
    }

    // q(t) = t^2/(tau*dia) - (1-a)*t/tau - (1-a); f = 1 - s*(q*e^(-t/tau) + 1 - a)
    fn q(&self, t: f64) -> (f64, f64, f64) {
        let k = 1.0 - self.a;
        let td = self.tau * self.dia;
        (
            t * t / td - k * t / self.tau - k,
            2.0 * t / td - k / self.tau,
            2.0 / td,
        )
    }

    fn remaining(&self, t: f64) -> f64 {
        let (q, _, _) = self.q(t);
        self.s.mul_add(-(q * (-t / self.tau).exp() + 1.0 - self.a), 1.0)
    }

    fn primitive(&self, t: f64) -> f64 {
        let (q, dq, ddq) = self.q(t);
        let tau = self.tau;
        -tau * (-t / tau).exp() * (q + tau * dq + tau * tau * ddq)
    }

    fn integral(&self, t: f64) -> f64 {
        let k = 1.0 - self.a;
        t - self.s * (self.primitive(t) - self.primitive(0.0) + k * t)
    }
}

/// Insulin decay curve selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsulinCurve {
    Walsh(WalshCurve),
    Exponential(ExponentialCurve),
}

impl InsulinCurve {
    /// Walsh reference curve; DIA must be 3, 4, 5 or 6 h.
    pub fn walsh(dia: f64) -> Result<Self> {
        Ok(Self::Walsh(WalshCurve::new(dia)?))
    }

    pub fn exponential(dia: f64, peak_h: f64) -> Result<Self> {
        Ok(Self::Exponential(ExponentialCurve::new(dia, peak_h)?))
    }

    pub fn rapid_acting(dia: f64) -> Result<Self> {
        Self::exponential(dia, RAPID_ACTING_PEAK_H)
    }

    pub fn ultra_rapid(dia: f64) -> Result<Self> {
        Self::exponential(dia, ULTRA_RAPID_PEAK_H)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Walsh(_) => "walsh",
            Self::Exponential(_) => "exponential",
        }
    }

    /// Duration of insulin action (h).
    #[must_use]
    pub const fn dia(&self) -> f64 {
        match self {
            Self::Walsh(c) => c.dia,
            Self::Exponential(c) => c.dia,
        }
    }

    /// Fraction of insulin still active `t` hours after delivery, in `[0, 1]`.
    #[must_use]
    pub fn remaining(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 1.0;
        }
        if t >= self.dia() {
            return 0.0;
        }
        let f = match self {
            Self::Walsh(c) => c.remaining(t),
            Self::Exponential(c) => c.remaining(t),
        };
        f.clamp(0.0, 1.0)
    }

    /// `∫₀ᵗ remaining(s) ds`, constant past DIA and zero before delivery.
    #[must_use]
    pub fn integral(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, self.dia());
        match self {
            Self::Walsh(c) => c.integral(t),
            Self::Exponential(c) => c.integral(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3.0, 1.4532)]
    #[case(4.0, 1.9357)]
    #[case(5.0, 2.4155)]
    #[case(6.0, 2.9312)]
    fn walsh_boundaries(#[case] dia: f64, #[case] area: f64) {
        let c = InsulinCurve::walsh(dia).unwrap();
        assert_eq!(c.remaining(0.0), 1.0);
        assert!(c.remaining(dia - 1e-9).abs() < 1e-3);
        assert_eq!(c.integral(0.0), 0.0);
        assert!((c.integral(dia) - area).abs() < 1e-3);
        assert_eq!(c.integral(dia + 2.0), c.integral(dia));
    }

    #[rstest]
    #[case(3.0)]
    #[case(4.0)]
    #[case(5.0)]
    #[case(6.0)]
    fn walsh_integral_matches_clamped_quadrature(#[case] dia: f64) {
        let c = InsulinCurve::walsh(dia).unwrap();
        let n = 20_000;
        let h = dia / f64::from(n);
        let mut acc = 0.0;
        for i in 0..n {
            let t = (f64::from(i) + 0.5) * h;
            acc += c.remaining(t) * h;
            if i % 1000 == 999 {
                let upto = f64::from(i + 1) * h;
                assert!((c.integral(upto) - acc).abs() < 1e-6, "t = {upto}");
            }
        }
    }

    #[test]
    fn walsh_rejects_other_dia() {
        let err = InsulinCurve::walsh(3.5).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AidError>(),
            Some(&AidError::UnsupportedDia(3.5))
        );
    }

    #[test]
    fn walsh_early_activity() {
        let c = InsulinCurve::walsh(4.0).unwrap();
        assert!((c.remaining(5.0 / 60.0) - 0.994).abs() < 1e-3);
        assert!((c.remaining(2.0) - 0.462).abs() < 1e-3);
    }

    #[rstest]
    #[case(5.0, RAPID_ACTING_PEAK_H, 1.8647)]
    #[case(6.0, RAPID_ACTING_PEAK_H, 2.0223)]
    #[case(5.0, ULTRA_RAPID_PEAK_H, 1.5555)]
    fn exponential_boundaries(#[case] dia: f64, #[case] peak: f64, #[case] area: f64) {
        let c = InsulinCurve::exponential(dia, peak).unwrap();
        assert!((c.remaining(1e-9) - 1.0).abs() < 1e-6);
        assert!(c.remaining(dia - 1e-9).abs() < 1e-3);
        assert!((c.integral(dia) - area).abs() < 1e-3);
    }

    #[test]
    fn exponential_integral_matches_quadrature() {
        let c = InsulinCurve::ultra_rapid(3.0).unwrap();
        let n = 3000;
        let h = 3.0 / f64::from(n);
        let mut acc = 0.0;
        for i in 0..n {
            let t = f64::from(i) * h;
            acc += (c.remaining(t) + c.remaining(t + h)) / 2.0 * h;
        }
        assert!((c.integral(3.0) - acc).abs() < 1e-4);
    }

    #[test]
    fn exponential_rejects_late_peak() {
        assert!(InsulinCurve::exponential(4.0, 2.0).is_err());
        assert!(InsulinCurve::exponential(4.0, 0.0).is_err());
        assert!(InsulinCurve::rapid_acting(5.0).is_ok());
    }

    #[test]
    fn clamps_outside_action_window() {
        let c = InsulinCurve::rapid_acting(5.0).unwrap();
        assert_eq!(c.remaining(-1.0), 1.0);
        assert_eq!(c.remaining(6.0), 0.0);
        assert_eq!(c.integral(-1.0), 0.0);
        assert_eq!(c.name(), "exponential");
        assert_eq!(c.dia(), 5.0);
    }
}
