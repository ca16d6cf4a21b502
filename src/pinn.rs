use crate::config::ModelConfig;
use crate::data::LabeledSamples;
use crate::domain::{Domain, column_tensor, coords_tensor, to_vec};
use crate::error::{PinnError, PinnResult};
use crate::jet::Jet;
use crate::lbfgs::{Lbfgs, LbfgsConfig, LbfgsOutcome};
use crate::model::BurgersNet;
use crate::{MODEL_CONFIG_FILENAME, MODEL_FILENAME};
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use log::debug;
use rand::Rng;
use std::path::Path;

/// 学習済み（または学習中）のネットワークを、ドメインと粘性係数とともに
/// 評価するための組。
#[derive(Debug, Clone)]
pub struct Pinn<B: Backend> {
    net: BurgersNet<B>,
    domain: Domain,
    nu: f64,
}

impl<B: Backend> Pinn<B> {
    pub fn new(net: BurgersNet<B>, domain: Domain, nu: f64) -> PinnResult<Self> {
        if !nu.is_finite() || nu < 0.0 {
            return Err(PinnError::MalformedInput(format!(
                "粘性係数は非負の有限値でなければなりません: {nu}"
            )));
        }
        Ok(Self { net, domain, nu })
    }

    pub fn net(&self) -> &BurgersNet<B> {
        &self.net
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// 生の座標 `[n, 2]` (列は x, t) での u の予測 `[n, 1]`。
    pub fn net_u(&self, coords: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(self.domain.normalize(coords))
    }

    /// Burgers 方程式の残差 `f = u_t + u u_x - nu u_xx`。
    pub fn net_f(&self, coords: Tensor<B, 2>) -> Tensor<B, 2> {
        let jet = self.net.forward_jet(Jet::seed(&self.domain, coords));
        jet.d_t + jet.value.mul(jet.d_x) - jet.d_xx.mul_scalar(self.nu)
    }

    /// 任意の点での (u, f)。パラメータは変更しません。空の点群には空を返します。
    pub fn predict(&self, coords: &[[f64; 2]]) -> (Vec<f64>, Vec<f64>) {
        if coords.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let device = self.device();
        let x = coords_tensor::<B>(coords, &device);
        let u = to_vec(self.net_u(x.clone()));
        let f = to_vec(self.net_f(x));
        (u, f)
    }

    /// 点群上の残差の二乗平均。
    pub fn mean_squared_residual(&self, coords: &[[f64; 2]]) -> f64 {
        let (_, f) = self.predict(coords);
        mean_square(&f)
    }

    fn device(&self) -> B::Device {
        self.net
            .devices()
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    pub fn config(&self) -> ModelConfig {
        ModelConfig::new(
            self.net.layers(),
            self.domain.lower(),
            self.domain.upper(),
            self.nu,
        )
    }

    /// パラメータと構成を `dir` に保存します。
    pub fn save(&self, dir: &Path) -> PinnResult<()> {
        std::fs::create_dir_all(dir)?;
        self.config().save(dir.join(MODEL_CONFIG_FILENAME))?;
        self.net.clone().save_file(
            dir.join(MODEL_FILENAME),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        )?;
        Ok(())
    }

    /// `save` で保存したモデルを読み込みます。
    pub fn load(dir: &Path, device: &B::Device) -> PinnResult<Self> {
        let model_path = dir.join(MODEL_FILENAME);
        if !model_path.exists() {
            return Err(PinnError::MissingModel(model_path));
        }
        let config = ModelConfig::load(dir.join(MODEL_CONFIG_FILENAME))
            .map_err(|e| PinnError::Config(e.to_string()))?;
        let domain = Domain::new(config.lower_bound, config.upper_bound)?;
        let net = BurgersNet::zeros(&config.layers, device)?.load_file(
            model_path,
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )?;
        Self::new(net, domain, config.nu)
    }
}

impl<B: AutodiffBackend> Pinn<B> {
    /// 自動微分のグラフを作らない評価用のコピー。
    pub fn valid(&self) -> Pinn<B::InnerBackend> {
        Pinn {
            net: self.net.valid(),
            domain: self.domain,
            nu: self.nu,
        }
    }
}

/// 物理情報ニューラルネットワーク。
///
/// ラベル付きサンプルへの当てはめ誤差と、コロケーション点での Burgers 方程式の
/// 残差を同じ重みで足し合わせた損失を、全バッチの L-BFGS で最小化します。
pub struct PhysicsInformedNN<B: Backend> {
    pinn: Pinn<B>,
    x_u: Tensor<B, 2>,
    u: Tensor<B, 2>,
    x_f: Tensor<B, 2>,
    device: B::Device,
}

impl<B: Backend> PhysicsInformedNN<B> {
    /// `nu` は必須です。既定値は持ちません。
    pub fn new<R: Rng + ?Sized>(
        labeled: &LabeledSamples,
        collocation: &[[f64; 2]],
        layers: &[usize],
        domain: Domain,
        nu: f64,
        rng: &mut R,
        device: &B::Device,
    ) -> PinnResult<Self> {
        if labeled.coords.len() != labeled.values.len() {
            return Err(PinnError::ShapeMismatch {
                what: "ラベル付きサンプルの値の数",
                expected: labeled.coords.len(),
                actual: labeled.values.len(),
            });
        }
        if labeled.is_empty() || collocation.is_empty() {
            return Err(PinnError::MalformedInput(format!(
                "学習点が空です (ラベル付き {}, コロケーション {})",
                labeled.len(),
                collocation.len()
            )));
        }

        let net = BurgersNet::new(layers, rng, device)?;
        debug!(
            "ネットワークを初期化しました: 層 {:?}, パラメータ数 {}",
            layers,
            net.num_parameters()
        );
        Ok(Self {
            pinn: Pinn::new(net, domain, nu)?,
            x_u: coords_tensor::<B>(&labeled.coords, device),
            u: column_tensor::<B>(&labeled.values, device),
            x_f: coords_tensor::<B>(collocation, device),
            device: device.clone(),
        })
    }

    pub fn pinn(&self) -> &Pinn<B> {
        &self.pinn
    }

    pub fn predict(&self, coords: &[[f64; 2]]) -> (Vec<f64>, Vec<f64>) {
        self.pinn.predict(coords)
    }

    /// 現在のパラメータでの損失。
    pub fn loss(&self) -> f64 {
        self.loss_of(&self.pinn).into_scalar().elem::<f64>()
    }

    fn loss_of(&self, pinn: &Pinn<B>) -> Tensor<B, 1> {
        let u_pred = pinn.net_u(self.x_u.clone());
        let f_pred = pinn.net_f(self.x_f.clone());
        let mse = MseLoss::new();
        let loss_u = mse.forward(u_pred, self.u.clone(), Reduction::Mean);
        let loss_f = mse.forward(f_pred.clone(), Tensor::zeros_like(&f_pred), Reduction::Mean);
        loss_u + loss_f
    }
}

impl<B: AutodiffBackend> PhysicsInformedNN<B> {
    /// 損失を L-BFGS で最小化し、結果のパラメータに置き換えます。
    ///
    /// `callback` は各反復の後に (反復番号, 損失) で呼ばれます。
    /// 2回目以降の呼び出しは現在のパラメータから再開します。
    pub fn train<C>(&mut self, config: &LbfgsConfig, callback: C) -> PinnResult<LbfgsOutcome>
    where
        C: FnMut(usize, f64),
    {
        let initial = self.pinn.net.flat_parameters();
        let outcome =
            Lbfgs::new(config.clone()).minimize(initial, |params| self.objective(params), callback)?;
        self.pinn.net = self
            .pinn
            .net
            .with_flat_parameters(&outcome.params, &self.device)?;
        Ok(outcome)
    }

    fn objective(&self, params: &[f64]) -> PinnResult<(f64, Vec<f64>)> {
        let net = self.pinn.net.with_flat_parameters(params, &self.device)?;
        let pinn = Pinn {
            net,
            domain: self.pinn.domain,
            nu: self.pinn.nu,
        };
        let loss = self.loss_of(&pinn);
        let value = loss.clone().into_scalar().elem::<f64>();
        let grads = loss.backward();
        let gradient = pinn.net.flat_gradients(&grads)?;
        Ok((value, gradient))
    }
}

/// 二乗平均。空なら 0。
pub fn mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64
}

/// 相対 L2 誤差 `||exact - pred|| / ||exact||`。
pub fn relative_l2_error(exact: &[f64], pred: &[f64]) -> f64 {
    let diff: f64 = exact.iter().zip(pred).map(|(e, p)| (e - p).powi(2)).sum();
    let norm: f64 = exact.iter().map(|e| e * e).sum();
    (diff / norm).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray<f64>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    const LAYERS: [usize; 4] = [2, 12, 12, 1];

    fn domain() -> Domain {
        Domain::new([-1.0, 0.0], [1.0, 1.0]).unwrap()
    }

    fn pinn(seed: u64, nu: f64) -> Pinn<TestBackend> {
        let mut rng = StdRng::seed_from_u64(seed);
        let net = BurgersNet::new(&LAYERS, &mut rng, &Default::default()).unwrap();
        Pinn::new(net, domain(), nu).unwrap()
    }

    fn sample_points() -> Vec<[f64; 2]> {
        vec![[-0.7, 0.1], [0.0, 0.5], [0.3, 0.25], [0.9, 0.95]]
    }

    #[test]
    fn jet_derivatives_match_finite_differences() {
        let model = pinn(11, 0.0);
        let device = Default::default();
        let points = sample_points();
        let jet = model
            .net()
            .forward_jet(Jet::seed(model.domain(), coords_tensor::<TestBackend>(&points, &device)));
        let (u_x, u_t, u_xx) = (to_vec(jet.d_x), to_vec(jet.d_t), to_vec(jet.d_xx));

        let u_at = |p: [f64; 2]| model.predict(&[p]).0[0];
        let h = 1e-4;
        for (i, &[x, t]) in points.iter().enumerate() {
            let fd_x = (u_at([x + h, t]) - u_at([x - h, t])) / (2.0 * h);
            let fd_t = (u_at([x, t + h]) - u_at([x, t - h])) / (2.0 * h);
            let fd_xx = (u_at([x + h, t]) - 2.0 * u_at([x, t]) + u_at([x - h, t])) / (h * h);
            assert!((u_x[i] - fd_x).abs() < 1e-6, "u_x: {} vs {}", u_x[i], fd_x);
            assert!((u_t[i] - fd_t).abs() < 1e-6, "u_t: {} vs {}", u_t[i], fd_t);
            assert!((u_xx[i] - fd_xx).abs() < 1e-3, "u_xx: {} vs {}", u_xx[i], fd_xx);
        }
    }

    #[test]
    fn residual_combines_derivatives() {
        let nu = 0.01 / std::f64::consts::PI;
        let model = pinn(5, nu);
        let device = Default::default();
        let points = sample_points();
        let jet = model
            .net()
            .forward_jet(Jet::seed(model.domain(), coords_tensor::<TestBackend>(&points, &device)));
        let (u, u_x, u_t, u_xx) = (
            to_vec(jet.value),
            to_vec(jet.d_x),
            to_vec(jet.d_t),
            to_vec(jet.d_xx),
        );

        let (_, f) = model.predict(&points);

        for i in 0..points.len() {
            let expected = u_t[i] + u[i] * u_x[i] - nu * u_xx[i];
            assert!((f[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn constant_network_has_zero_residual() {
        let device = Default::default();
        let model = pinn(3, 0.1);
        let mut params = vec![0.0; model.net().num_parameters()];
        // 最終層のバイアスだけを非ゼロにすると u は定数になる
        *params.last_mut().unwrap() = 0.75;
        let net = model.net().with_flat_parameters(&params, &device).unwrap();
        let constant = Pinn::new(net, domain(), 0.1).unwrap();

        let (u, f) = constant.predict(&sample_points());

        assert!(u.iter().all(|v| (v - 0.75).abs() < 1e-12));
        assert!(f.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn predict_is_deterministic() {
        let model = pinn(8, 0.01);
        let points = sample_points();

        assert_eq!(model.predict(&points), model.predict(&points));
    }

    #[test]
    fn predict_on_no_points_returns_empty() {
        let model = pinn(8, 0.01);
        assert_eq!(model.predict(&[]), (Vec::new(), Vec::new()));
        assert_eq!(model.mean_squared_residual(&[]), 0.0);

        let problem = training_problem(2);
        assert_eq!(problem.predict(&[]), (Vec::new(), Vec::new()));
    }

    #[test]
    fn error_metrics() {
        assert_eq!(mean_square(&[]), 0.0);
        assert_eq!(mean_square(&[1.0, -3.0]), 5.0);
        assert_eq!(relative_l2_error(&[3.0, 4.0], &[3.0, 4.0]), 0.0);
        assert!((relative_l2_error(&[3.0, 4.0], &[0.0, 0.0]) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn negative_viscosity_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = BurgersNet::<TestBackend>::new(&LAYERS, &mut rng, &Default::default()).unwrap();
        assert!(Pinn::new(net, domain(), -1.0).is_err());
    }

    fn training_problem(seed: u64) -> PhysicsInformedNN<TestAutodiffBackend> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut labeled = LabeledSamples::default();
        for i in 0..16 {
            let x = -1.0 + 2.0 * i as f64 / 15.0;
            labeled.push([x, 0.0], -(std::f64::consts::PI * x).sin());
        }
        let collocation: Vec<[f64; 2]> = crate::data::latin_hypercube(64, &mut rng)
            .into_iter()
            .map(|p| domain().scale_unit(p))
            .collect();
        PhysicsInformedNN::new(
            &labeled,
            &collocation,
            &LAYERS,
            domain(),
            0.01 / std::f64::consts::PI,
            &mut rng,
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn loss_is_non_negative() {
        for seed in 0..5 {
            assert!(training_problem(seed).loss() >= 0.0);
        }
    }

    #[test]
    fn training_reduces_loss_and_reports_each_step() {
        let mut model = training_problem(1234);
        let before = model.loss();
        let mut reported = Vec::new();

        let outcome = model
            .train(&LbfgsConfig::new().with_max_iter(20), |_, loss| reported.push(loss))
            .unwrap();

        assert!(outcome.iterations > 0);
        assert_eq!(reported.len(), outcome.iterations);
        assert!(outcome.loss < before);
        assert!((model.loss() - outcome.loss).abs() < 1e-4);
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let labeled = LabeledSamples {
            coords: vec![[0.0, 0.0], [0.5, 0.0]],
            values: vec![1.0],
        };
        let result = PhysicsInformedNN::<TestBackend>::new(
            &labeled,
            &[[0.0, 0.5]],
            &LAYERS,
            domain(),
            0.01,
            &mut rng,
            &Default::default(),
        );
        assert!(matches!(result, Err(PinnError::ShapeMismatch { .. })));
    }

    #[test]
    fn save_and_load_preserve_predictions() {
        type RecordBackend = NdArray<f32>;
        let dir = std::env::temp_dir().join(format!("burgers-pinn-{}", std::process::id()));
        let mut rng = StdRng::seed_from_u64(21);
        let net = BurgersNet::<RecordBackend>::new(&LAYERS, &mut rng, &Default::default()).unwrap();
        let model = Pinn::new(net, domain(), 0.02).unwrap();
        let points = sample_points();

        model.save(&dir).unwrap();
        let loaded = Pinn::<RecordBackend>::load(&dir, &Default::default()).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(loaded.nu(), 0.02);
        assert_eq!(loaded.domain(), model.domain());
        assert_eq!(loaded.predict(&points), model.predict(&points));
    }

    #[test]
    fn loading_without_model_file_fails() {
        let dir = std::env::temp_dir().join("burgers-pinn-missing");
        let result = Pinn::<TestBackend>::load(&dir, &Default::default());
        assert!(matches!(result, Err(PinnError::MissingModel(_))));
    }
}
