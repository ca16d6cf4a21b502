//! 2階までの前進モード微分。
//!
//! `burn` の自動微分は2階微分（double backward）を扱えないため、残差に必要な
//! `u_x`, `u_t`, `u_xx` は値と一緒に各層へ順方向に伝播させます。
//! 伝播はすべてテンソル演算で書かれているので、得られた残差はパラメータに
//! 関する逆伝播グラフにそのまま乗ります。

use crate::domain::Domain;
use burn::nn::{Linear, Tanh};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// 値と入力 (x, t) に関する微分の組。各テンソルは `[n, width]`。
#[derive(Debug, Clone)]
pub struct Jet<B: Backend> {
    pub value: Tensor<B, 2>,
    pub d_x: Tensor<B, 2>,
    pub d_t: Tensor<B, 2>,
    pub d_xx: Tensor<B, 2>,
}

impl<B: Backend> Jet<B> {
    /// 生の座標 `[n, 2]` (列は x, t) を正規化し、入力層のジェットを作ります。
    pub fn seed(domain: &Domain, coords: Tensor<B, 2>) -> Self {
        let [n, _] = coords.dims();
        let device = coords.device();
        let [scale_x, scale_t] = domain.scale();
        let ones = Tensor::<B, 2>::ones([n, 1], &device);
        let zeros = Tensor::<B, 2>::zeros([n, 1], &device);

        Self {
            value: domain.normalize(coords),
            d_x: Tensor::cat(vec![ones.clone().mul_scalar(scale_x), zeros.clone()], 1),
            d_t: Tensor::cat(vec![zeros.clone(), ones.mul_scalar(scale_t)], 1),
            d_xx: Tensor::zeros([n, 2], &device),
        }
    }

    /// アフィン層 `z = h W + b`。微分にはバイアスが効きません。
    pub fn affine(self, linear: &Linear<B>) -> Self {
        let weight = linear.weight.val();
        Self {
            value: linear.forward(self.value),
            d_x: self.d_x.matmul(weight.clone()),
            d_t: self.d_t.matmul(weight.clone()),
            d_xx: self.d_xx.matmul(weight),
        }
    }

    /// `a = tanh(z)`, `a' = 1 - a²`, `a'' = -2 a a'`
    pub fn tanh(self, activation: &Tanh) -> Self {
        let a = activation.forward(self.value);
        let da = a.clone().mul(a.clone()).neg().add_scalar(1.0);
        let dda = a.clone().mul(da.clone()).mul_scalar(-2.0);
        let d_x_sq = self.d_x.clone().mul(self.d_x.clone());

        Self {
            value: a,
            d_xx: da.clone().mul(self.d_xx) + dda.mul(d_x_sq),
            d_x: da.clone().mul(self.d_x),
            d_t: da.mul(self.d_t),
        }
    }
}
