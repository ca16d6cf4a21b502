use crate::domain::to_vec;
use crate::error::{PinnError, PinnResult};
use crate::jet::Jet;
use burn::module::{Module, Param};
use burn::nn::{Linear, Tanh};
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// PINNの本体となるニューラルネットワークモデル。
///
/// 正規化済みの座標 (x, t) を入力とし、その点における u を予測する
/// 多層パーセプトロン（MLP）です。最終層以外の出力には tanh を適用します。
#[derive(Module, Debug)]
pub struct BurgersNet<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
}

impl<B: Backend> BurgersNet<B> {
    /// Xavier 初期化でモデルを作ります。
    ///
    /// 重みは標準偏差 `sqrt(2 / (fan_in + fan_out))` の正規分布を ±2σ で
    /// 打ち切った値、バイアスはゼロです。乱数は引数の `rng` からのみ引きます。
    pub fn new<R: Rng + ?Sized>(
        layers: &[usize],
        rng: &mut R,
        device: &B::Device,
    ) -> PinnResult<Self> {
        Self::from_fn(layers, device, |fan_in, fan_out| {
            let stddev = (2.0 / (fan_in + fan_out) as f64).sqrt();
            (0..fan_in * fan_out)
                .map(|_| truncated_normal(&mut *rng) * stddev)
                .collect()
        })
    }

    /// すべての重みがゼロのモデル。保存済みレコードを読み込む土台に使います。
    pub fn zeros(layers: &[usize], device: &B::Device) -> PinnResult<Self> {
        Self::from_fn(layers, device, |fan_in, fan_out| vec![0.0; fan_in * fan_out])
    }

    fn from_fn<F>(layers: &[usize], device: &B::Device, mut weights: F) -> PinnResult<Self>
    where
        F: FnMut(usize, usize) -> Vec<f64>,
    {
        validate_topology(layers)?;
        let linears = layers
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let bias = vec![0.0; fan_out];
                linear_from::<B>(&weights(fan_in, fan_out), &bias, fan_in, fan_out, device)
            })
            .collect();
        Ok(Self {
            linears,
            activation: Tanh::new(),
        })
    }

    /// モデルの順伝播を実行します。入力は正規化済みの `[n, 2]`。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let Some((last, hidden)) = self.linears.split_last() else {
            return input;
        };
        let mut x = input;
        for linear in hidden {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }
        last.forward(x)
    }

    /// 値と入力微分を同時に伝播させます。
    pub fn forward_jet(&self, input: Jet<B>) -> Jet<B> {
        let Some((last, hidden)) = self.linears.split_last() else {
            return input;
        };
        let mut jet = input;
        for linear in hidden {
            jet = jet.affine(linear).tanh(&self.activation);
        }
        jet.affine(last)
    }

    /// 層の幅の列 `[n0, n1, ..., nL]`。
    pub fn layers(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.linears.len() + 1);
        for (i, linear) in self.linears.iter().enumerate() {
            let [fan_in, fan_out] = linear.weight.val().dims();
            if i == 0 {
                widths.push(fan_in);
            }
            widths.push(fan_out);
        }
        widths
    }

    /// 各層の (重みの形状, バイアス長)。
    pub fn shapes(&self) -> Vec<([usize; 2], usize)> {
        self.linears
            .iter()
            .map(|linear| {
                let bias_len = linear.bias.as_ref().map_or(0, |b| b.val().dims()[0]);
                (linear.weight.val().dims(), bias_len)
            })
            .collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.shapes()
            .iter()
            .map(|([fan_in, fan_out], bias)| fan_in * fan_out + bias)
            .sum()
    }

    /// パラメータを層ごとに「重み（行優先）→バイアス」の順で平坦化します。
    pub fn flat_parameters(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.num_parameters());
        for linear in &self.linears {
            flat.extend(to_vec(linear.weight.val()));
            if let Some(bias) = &linear.bias {
                flat.extend(to_vec(bias.val()));
            }
        }
        flat
    }

    /// 平坦化したパラメータから同じ構成の新しいモデルを作ります。
    pub fn with_flat_parameters(&self, params: &[f64], device: &B::Device) -> PinnResult<Self> {
        let expected = self.num_parameters();
        if params.len() != expected {
            return Err(PinnError::ShapeMismatch {
                what: "パラメータ数",
                expected,
                actual: params.len(),
            });
        }
        let mut offset = 0;
        let mut linears = Vec::with_capacity(self.linears.len());
        for ([fan_in, fan_out], _) in self.shapes() {
            let weights = &params[offset..offset + fan_in * fan_out];
            offset += fan_in * fan_out;
            let bias = &params[offset..offset + fan_out];
            offset += fan_out;
            linears.push(linear_from::<B>(weights, bias, fan_in, fan_out, device));
        }
        Ok(Self {
            linears,
            activation: Tanh::new(),
        })
    }
}

impl<B: AutodiffBackend> BurgersNet<B> {
    /// 逆伝播の結果からパラメータ勾配を `flat_parameters` と同じ順で取り出します。
    pub fn flat_gradients(&self, grads: &B::Gradients) -> PinnResult<Vec<f64>> {
        let mut flat = Vec::with_capacity(self.num_parameters());
        for linear in &self.linears {
            let weight = linear.weight.val().grad(grads).ok_or(PinnError::MissingGradient)?;
            flat.extend(to_vec(weight));
            if let Some(bias) = &linear.bias {
                let bias = bias.val().grad(grads).ok_or(PinnError::MissingGradient)?;
                flat.extend(to_vec(bias));
            }
        }
        Ok(flat)
    }
}

fn validate_topology(layers: &[usize]) -> PinnResult<()> {
    if layers.len() < 2 {
        return Err(PinnError::InvalidTopology(format!(
            "少なくとも入力層と出力層が必要です: {layers:?}"
        )));
    }
    if layers.contains(&0) {
        return Err(PinnError::InvalidTopology(format!(
            "幅 0 の層があります: {layers:?}"
        )));
    }
    if layers[0] != 2 || layers[layers.len() - 1] != 1 {
        return Err(PinnError::InvalidTopology(format!(
            "入力は (x, t) の 2 次元、出力は u の 1 次元でなければなりません: {layers:?}"
        )));
    }
    Ok(())
}

fn linear_from<B: Backend>(
    weights: &[f64],
    bias: &[f64],
    fan_in: usize,
    fan_out: usize,
    device: &B::Device,
) -> Linear<B> {
    let weight = TensorData::new(weights.to_vec(), [fan_in, fan_out]).convert::<B::FloatElem>();
    let bias = TensorData::new(bias.to_vec(), [fan_out]).convert::<B::FloatElem>();
    Linear {
        weight: Param::from_tensor(Tensor::from_data(weight, device).require_grad()),
        bias: Some(Param::from_tensor(Tensor::from_data(bias, device).require_grad())),
    }
}

/// ±2σ で打ち切った標準正規乱数。
fn truncated_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let z: f64 = StandardNormal.sample(rng);
        if z.abs() <= 2.0 {
            return z;
        }
    }
}
