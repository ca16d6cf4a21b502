//! 全バッチ用の L-BFGS 最適化器。
//!
//! 境界制約なしの L-BFGS-B に相当します。探索方向は2ループ再帰で求め、
//! ステップ幅は強 Wolfe 条件を満たす直線探索で決めます。
//! パラメータは f64 の平坦なベクトルとして扱います。

use crate::error::{PinnError, PinnResult};
use burn::config::Config;
use log::debug;
use std::collections::VecDeque;

/// 十分減少条件（Armijo）の係数
const C1: f64 = 1e-4;
/// 曲率条件の係数
const C2: f64 = 0.9;
/// 区間がこれより狭くなったら直線探索を打ち切る
const MIN_BRACKET: f64 = 1e-12;

#[derive(Config, Debug)]
pub struct LbfgsConfig {
    /// 最大反復回数
    #[config(default = 50000)]
    pub max_iter: usize,
    /// 目的関数の最大評価回数
    #[config(default = 50000)]
    pub max_eval: usize,
    /// 保持する曲率ペアの数 (maxcor)。0 なら曲率情報を使わず最急降下方向に進む
    #[config(default = 50)]
    pub history_size: usize,
    /// 1回の直線探索での最大評価回数 (maxls)
    #[config(default = 50)]
    pub max_line_search: usize,
    /// 相対的な損失減少がこれ以下なら収束
    #[config(default = "f64::EPSILON")]
    pub ftol: f64,
    /// 勾配の最大絶対値がこれ以下なら収束
    #[config(default = 1e-5)]
    pub gtol: f64,
}

/// 最適化が止まった理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 損失の相対減少が `ftol` 以下になった
    FunctionTolerance,
    /// 勾配が `gtol` 以下になった
    GradientTolerance,
    MaxIterations,
    MaxEvaluations,
    /// 減少するステップが見つからなかった
    LineSearchFailed,
}

#[derive(Debug, Clone)]
pub struct LbfgsOutcome {
    pub params: Vec<f64>,
    pub loss: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub termination: Termination,
}

/// 直線探索上の1点。
#[derive(Debug, Clone)]
struct LinePoint {
    step: f64,
    loss: f64,
    grad: Vec<f64>,
    slope: f64,
}

struct CurvaturePair {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// 目的関数の評価回数を数えるラッパー。
struct Counted<F> {
    objective: F,
    evaluations: usize,
}

impl<F> Counted<F>
where
    F: FnMut(&[f64]) -> PinnResult<(f64, Vec<f64>)>,
{
    fn eval(&mut self, params: &[f64]) -> PinnResult<(f64, Vec<f64>)> {
        self.evaluations += 1;
        (self.objective)(params)
    }
}

pub struct Lbfgs {
    config: LbfgsConfig,
}

impl Lbfgs {
    pub fn new(config: LbfgsConfig) -> Self {
        Self { config }
    }

    /// `objective` を最小化します。
    ///
    /// `objective` はパラメータを受け取り (損失, 勾配) を返します。
    /// `callback` は受理されたステップごとに (反復番号, 損失) で呼ばれます。
    pub fn minimize<F, C>(
        &self,
        initial: Vec<f64>,
        objective: F,
        mut callback: C,
    ) -> PinnResult<LbfgsOutcome>
    where
        F: FnMut(&[f64]) -> PinnResult<(f64, Vec<f64>)>,
        C: FnMut(usize, f64),
    {
        let config = &self.config;
        let mut objective = Counted {
            objective,
            evaluations: 0,
        };
        let mut params = initial;
        let (mut loss, mut grad) = objective.eval(&params)?;
        if !loss.is_finite() || !all_finite(&grad) {
            return Err(PinnError::Divergence {
                evaluation: objective.evaluations,
                loss,
            });
        }

        let mut history: VecDeque<CurvaturePair> = VecDeque::with_capacity(config.history_size);
        let mut iterations = 0;

        let finish = |params: Vec<f64>,
                      loss: f64,
                      iterations: usize,
                      evaluations: usize,
                      termination: Termination|
         -> PinnResult<LbfgsOutcome> {
            debug!("L-BFGS 終了: {termination:?} (反復 {iterations}, 評価 {evaluations})");
            Ok(LbfgsOutcome {
                params,
                loss,
                iterations,
                evaluations,
                termination,
            })
        };

        if max_abs(&grad) <= config.gtol {
            let evaluations = objective.evaluations;
            return finish(params, loss, 0, evaluations, Termination::GradientTolerance);
        }

        while iterations < config.max_iter {
            let evaluations = objective.evaluations;
            if evaluations >= config.max_eval {
                return finish(params, loss, iterations, evaluations, Termination::MaxEvaluations);
            }

            let mut direction = two_loop(&grad, &history);
            let mut slope = dot(&grad, &direction);
            if slope >= 0.0 {
                // 曲率情報が壊れたので最急降下からやり直す
                history.clear();
                direction = grad.iter().map(|g| -g).collect();
                slope = dot(&grad, &direction);
            }

            let initial_step = if iterations == 0 {
                (1.0 / norm(&grad)).min(1.0)
            } else {
                1.0
            };
            let budget = config.max_line_search.min(config.max_eval - evaluations);
            let start = LinePoint {
                step: 0.0,
                loss,
                grad: grad.clone(),
                slope,
            };
            let search =
                strong_wolfe(&mut objective, &params, &direction, &start, initial_step, budget)?;
            let evaluations = objective.evaluations;
            let Some(accepted) = search else {
                let termination = if evaluations >= config.max_eval {
                    Termination::MaxEvaluations
                } else {
                    Termination::LineSearchFailed
                };
                return finish(params, loss, iterations, evaluations, termination);
            };

            let next: Vec<f64> = axpy(&params, accepted.step, &direction);
            let s: Vec<f64> = direction.iter().map(|d| d * accepted.step).collect();
            let y: Vec<f64> = accepted.grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if config.history_size > 0 && sy > 1e-10 * dot(&y, &y) {
                if history.len() >= config.history_size {
                    history.pop_front();
                }
                history.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
            }

            let previous = loss;
            params = next;
            loss = accepted.loss;
            grad = accepted.grad;
            iterations += 1;
            callback(iterations, loss);

            let reduction = (previous - loss) / previous.abs().max(loss.abs()).max(1.0);
            if reduction <= config.ftol {
                return finish(params, loss, iterations, evaluations, Termination::FunctionTolerance);
            }
            if max_abs(&grad) <= config.gtol {
                return finish(params, loss, iterations, evaluations, Termination::GradientTolerance);
            }
        }

        let evaluations = objective.evaluations;
        finish(params, loss, iterations, evaluations, Termination::MaxIterations)
    }
}

/// 2ループ再帰で `-H g` を求めます。
fn two_loop(grad: &[f64], history: &VecDeque<CurvaturePair>) -> Vec<f64> {
    let mut q: Vec<f64> = grad.iter().map(|g| -g).collect();
    let mut alphas = Vec::with_capacity(history.len());
    for pair in history.iter().rev() {
        let alpha = pair.rho * dot(&pair.s, &q);
        for (qi, yi) in q.iter_mut().zip(&pair.y) {
            *qi -= alpha * yi;
        }
        alphas.push(alpha);
    }

    if let Some(latest) = history.back() {
        let gamma = dot(&latest.s, &latest.y) / dot(&latest.y, &latest.y);
        q.iter_mut().for_each(|qi| *qi *= gamma);
    }

    for (pair, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = pair.rho * dot(&pair.y, &q);
        for (qi, si) in q.iter_mut().zip(&pair.s) {
            *qi += (alpha - beta) * si;
        }
    }
    q
}

/// 強 Wolfe 条件を満たすステップを探します。
///
/// 損失を減らせるステップが見つからなければ `None` を返します。
/// 有限でない損失は行き過ぎとして扱い、区間を縮めます。
fn strong_wolfe<F>(
    objective: &mut Counted<F>,
    params: &[f64],
    direction: &[f64],
    start: &LinePoint,
    initial_step: f64,
    budget: usize,
) -> PinnResult<Option<LinePoint>>
where
    F: FnMut(&[f64]) -> PinnResult<(f64, Vec<f64>)>,
{
    let evaluate_at = |objective: &mut Counted<F>, step: f64| -> PinnResult<LinePoint> {
        let (loss, grad) = objective.eval(&axpy(params, step, direction))?;
        let slope = dot(&grad, direction);
        Ok(LinePoint {
            step,
            loss,
            grad,
            slope,
        })
    };
    let sufficient = |p: &LinePoint| p.loss <= start.loss + C1 * p.step * start.slope;
    let curvature = |p: &LinePoint| p.slope.abs() <= -C2 * start.slope;

    let mut used = 0;
    let mut previous = start.clone();
    let mut step = initial_step;

    // 区間 [lo, hi] を見つける
    let (mut lo, mut hi) = loop {
        if used >= budget {
            return Ok(improved(previous, start));
        }
        let current = evaluate_at(&mut *objective, step)?;
        used += 1;

        let rejected = !is_usable(&current) || !sufficient(&current);
        if rejected || (used > 1 && current.loss >= previous.loss) {
            break (previous, current);
        }
        if curvature(&current) {
            return Ok(Some(current));
        }
        if current.slope >= 0.0 {
            break (current, previous);
        }
        let min_step = current.step + 0.01 * (current.step - previous.step);
        let max_step = current.step * 10.0;
        step = cubic_minimizer(&previous, &current, min_step, max_step);
        previous = current;
    };

    // 区間を縮める (zoom)
    while used < budget {
        let width = (hi.step - lo.step).abs();
        if width * max_abs(direction) < MIN_BRACKET {
            break;
        }
        let (low, high) = (lo.step.min(hi.step), lo.step.max(hi.step));
        let mut trial = if is_usable(&hi) {
            cubic_minimizer(&lo, &hi, low, high)
        } else {
            0.5 * (lo.step + hi.step)
        };
        // 端に寄りすぎたら二分法
        if (trial - low).min(high - trial) < 0.1 * width {
            trial = 0.5 * (low + high);
        }

        let current = evaluate_at(&mut *objective, trial)?;
        used += 1;

        if !is_usable(&current) || !sufficient(&current) || current.loss >= lo.loss {
            hi = current;
        } else {
            if curvature(&current) {
                return Ok(Some(current));
            }
            if current.slope * (hi.step - lo.step) >= 0.0 {
                hi = lo;
            }
            lo = current;
        }
    }

    Ok(improved(lo, start))
}

fn improved(candidate: LinePoint, start: &LinePoint) -> Option<LinePoint> {
    (candidate.step > 0.0 && is_usable(&candidate) && candidate.loss < start.loss)
        .then_some(candidate)
}

fn is_usable(p: &LinePoint) -> bool {
    p.loss.is_finite() && all_finite(&p.grad)
}

/// 2点の値と傾きを通る3次多項式の最小点を `[min_step, max_step]` に収めて返します。
fn cubic_minimizer(a: &LinePoint, b: &LinePoint, min_step: f64, max_step: f64) -> f64 {
    let (lo, hi) = (min_step.min(max_step), min_step.max(max_step));
    let d1 = a.slope + b.slope - 3.0 * (a.loss - b.loss) / (a.step - b.step);
    let d2_sq = d1 * d1 - a.slope * b.slope;
    if !d2_sq.is_finite() || d2_sq < 0.0 {
        return 0.5 * (lo + hi);
    }
    let d2 = d2_sq.sqrt();
    let position = if a.step <= b.step {
        b.step - (b.step - a.step) * ((b.slope + d2 - d1) / (b.slope - a.slope + 2.0 * d2))
    } else {
        a.step - (a.step - b.step) * ((a.slope + d2 - d1) / (a.slope - b.slope + 2.0 * d2))
    };
    if position.is_finite() {
        position.clamp(lo, hi)
    } else {
        0.5 * (lo + hi)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

fn max_abs(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |m, v| m.max(v.abs()))
}

fn all_finite(a: &[f64]) -> bool {
    a.iter().all(|v| v.is_finite())
}

fn axpy(x: &[f64], alpha: f64, d: &[f64]) -> Vec<f64> {
    x.iter().zip(d).map(|(xi, di)| xi + alpha * di).collect()
}
