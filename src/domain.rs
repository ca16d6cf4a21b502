use crate::error::{PinnError, PinnResult};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};

/// (x, t) 平面上の矩形ドメイン。
///
/// ネットワークへの入力はこの境界を使って [-1, 1] に線形変換されます。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    lb: [f64; 2],
    ub: [f64; 2],
}

impl Domain {
    pub fn new(lb: [f64; 2], ub: [f64; 2]) -> PinnResult<Self> {
        let valid = (0..2).all(|i| lb[i].is_finite() && ub[i].is_finite() && lb[i] < ub[i]);
        if !valid {
            return Err(PinnError::InvalidDomain { lb, ub });
        }
        Ok(Self { lb, ub })
    }

    /// 点群の成分ごとの最小値・最大値からドメインを作ります。
    pub fn bounding(points: &[[f64; 2]]) -> PinnResult<Self> {
        if points.is_empty() {
            return Err(PinnError::MalformedInput(
                "ドメインを決める点がありません".into(),
            ));
        }
        let mut lb = [f64::INFINITY; 2];
        let mut ub = [f64::NEG_INFINITY; 2];
        for p in points {
            for i in 0..2 {
                lb[i] = lb[i].min(p[i]);
                ub[i] = ub[i].max(p[i]);
            }
        }
        Self::new(lb, ub)
    }

    pub fn lower(&self) -> [f64; 2] {
        self.lb
    }

    pub fn upper(&self) -> [f64; 2] {
        self.ub
    }

    pub fn width(&self) -> [f64; 2] {
        [self.ub[0] - self.lb[0], self.ub[1] - self.lb[1]]
    }

    /// 単位正方形 [0,1]² の点をドメイン内に写します。
    pub fn scale_unit(&self, unit: [f64; 2]) -> [f64; 2] {
        let w = self.width();
        [self.lb[0] + w[0] * unit[0], self.lb[1] + w[1] * unit[1]]
    }

    /// `H0 = 2 (X - lb) / (ub - lb) - 1` を計算します。
    ///
    /// 幅は境界テンソル同士の差として求めるので、`X = ub` は要素型の精度に
    /// 関係なく正確に 1 になります。
    pub fn normalize<B: Backend>(&self, coords: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = coords.device();
        let lb = bound_tensor::<B>(self.lb, &device);
        let ub = bound_tensor::<B>(self.ub, &device);
        let width = ub - lb.clone();
        (coords - lb).div(width).mul_scalar(2.0).sub_scalar(1.0)
    }

    /// 正規化の微分 `dH0/dX = 2 / (ub - lb)`。
    pub fn scale(&self) -> [f64; 2] {
        let w = self.width();
        [2.0 / w[0], 2.0 / w[1]]
    }
}

fn bound_tensor<B: Backend>(bound: [f64; 2], device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(bound.to_vec(), [1, 2]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

/// 座標列を `[n, 2]` のテンソルに変換します。
pub fn coords_tensor<B: Backend>(coords: &[[f64; 2]], device: &B::Device) -> Tensor<B, 2> {
    let flat: Vec<f64> = coords.iter().flat_map(|p| p.iter().copied()).collect();
    let data = TensorData::new(flat, [coords.len(), 2]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

/// 値の列を `[n, 1]` のテンソルに変換します。
pub fn column_tensor<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(values.to_vec(), [values.len(), 1]).convert::<B::FloatElem>();
    Tensor::from_data(data, device)
}

/// テンソルの要素を f64 の列として取り出します。
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor.into_data().iter::<f64>().collect()
}
