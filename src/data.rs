//! 学習データの準備。
//!
//! MATLAB 形式のファイルから格子上の厳密解を読み込み、境界・初期条件の
//! ラベル付きサンプルと、ラテン超方格サンプリングによるコロケーション点を
//! 作ります。

use crate::domain::Domain;
use crate::error::{PinnError, PinnResult};
use log::debug;
use matfile::{MatFile, NumericData};
use rand::Rng;
use rand::seq::SliceRandom;
use std::fs::File;
use std::path::Path;

/// 格子 (t, x) 上の解 u(x, t)。
///
/// `exact` は `t.len() × x.len()` の行優先で、`exact[i * x.len() + j]` が
/// `u(x[j], t[i])` です。
#[derive(Debug, Clone)]
pub struct BurgersData {
    pub x: Vec<f64>,
    pub t: Vec<f64>,
    pub exact: Vec<f64>,
}

/// 座標 (x, t) と既知の u の組。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledSamples {
    pub coords: Vec<[f64; 2]>,
    pub values: Vec<f64>,
}

impl BurgersData {
    /// `x`, `t`, `usol` を含む MAT ファイルを読み込みます。
    ///
    /// `usol` は `x.len() × t.len()` で、実部のみを使います。
    pub fn load(path: impl AsRef<Path>) -> PinnResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mat = MatFile::parse(file).map_err(|e| PinnError::MatFile(format!("{e:?}")))?;

        let x = real_values(&mat, "x")?;
        let t = real_values(&mat, "t")?;
        let usol = mat
            .find_by_name("usol")
            .ok_or_else(|| PinnError::MalformedInput("変数 'usol' がありません".into()))?;
        let size = usol.size();
        if size.len() != 2 || size[0] != x.len() || size[1] != t.len() {
            return Err(PinnError::MalformedInput(format!(
                "'usol' の形状 {size:?} が (len(x), len(t)) = ({}, {}) と一致しません",
                x.len(),
                t.len()
            )));
        }
        // 列優先の usol (nx × nt) はそのまま行優先の (nt × nx) として読める
        let exact = real_values(&mat, "usol")?;
        debug!(
            "'{}' を読み込みました: nx={}, nt={}",
            path.display(),
            x.len(),
            t.len()
        );
        Self::from_grid(x, t, exact)
    }

    pub fn from_grid(x: Vec<f64>, t: Vec<f64>, exact: Vec<f64>) -> PinnResult<Self> {
        if x.len() < 2 || t.len() < 2 {
            return Err(PinnError::MalformedInput(format!(
                "格子が小さすぎます: nx={}, nt={}",
                x.len(),
                t.len()
            )));
        }
        if exact.len() != x.len() * t.len() {
            return Err(PinnError::ShapeMismatch {
                what: "解の要素数",
                expected: x.len() * t.len(),
                actual: exact.len(),
            });
        }
        Ok(Self { x, t, exact })
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn nt(&self) -> usize {
        self.t.len()
    }

    pub fn at(&self, i_t: usize, i_x: usize) -> f64 {
        self.exact[i_t * self.nx() + i_x]
    }

    /// 全格子点を t ごとに x を走査する順で並べます（`exact` と同じ順）。
    pub fn grid_points(&self) -> Vec<[f64; 2]> {
        grid_points(&self.x, &self.t)
    }

    pub fn domain(&self) -> PinnResult<Domain> {
        Domain::bounding(&self.grid_points())
    }

    /// 初期条件 (t = t0 の行) と左右の境界 (x = x0, x = x_end の列) のサンプル。
    pub fn boundary_samples(&self) -> LabeledSamples {
        let (nx, nt) = (self.nx(), self.nt());
        let mut samples = LabeledSamples::default();
        for j in 0..nx {
            samples.push([self.x[j], self.t[0]], self.at(0, j));
        }
        for i in 0..nt {
            samples.push([self.x[0], self.t[i]], self.at(i, 0));
        }
        for i in 0..nt {
            samples.push([self.x[nx - 1], self.t[i]], self.at(i, nx - 1));
        }
        samples
    }
}

impl LabeledSamples {
    pub fn push(&mut self, coord: [f64; 2], value: f64) {
        self.coords.push(coord);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// 重複なしで `n` 個を無作為に選びます。
    pub fn choose<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> PinnResult<Self> {
        if n > self.len() {
            return Err(PinnError::MalformedInput(format!(
                "{} 個のサンプルから {n} 個は選べません",
                self.len()
            )));
        }
        let mut chosen = Self::default();
        for i in rand::seq::index::sample(rng, self.len(), n) {
            chosen.push(self.coords[i], self.values[i]);
        }
        Ok(chosen)
    }
}

/// 格子 `xs × ts` の点を t ごとに x を走査する順で並べます。
pub fn grid_points(xs: &[f64], ts: &[f64]) -> Vec<[f64; 2]> {
    ts.iter()
        .flat_map(|&t| xs.iter().map(move |&x| [x, t]))
        .collect()
}

/// 単位正方形上のラテン超方格サンプル。
///
/// 各次元を `n` 等分し、どの区間にもちょうど1点が入ります。
pub fn latin_hypercube<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<[f64; 2]> {
    let mut columns: [Vec<f64>; 2] = [Vec::with_capacity(n), Vec::with_capacity(n)];
    for column in columns.iter_mut() {
        column.extend((0..n).map(|i| (i as f64 + rng.random::<f64>()) / n as f64));
        column.shuffle(rng);
    }
    columns[0]
        .iter()
        .zip(&columns[1])
        .map(|(&a, &b)| [a, b])
        .collect()
}

/// `n_f` 個の LHS 点をドメインに写し、ラベル付きサンプルの座標を後ろに足します。
pub fn collocation_points<R: Rng + ?Sized>(
    n_f: usize,
    domain: &Domain,
    labeled: &LabeledSamples,
    rng: &mut R,
) -> Vec<[f64; 2]> {
    let mut points: Vec<[f64; 2]> = latin_hypercube(n_f, rng)
        .into_iter()
        .map(|unit| domain.scale_unit(unit))
        .collect();
    points.extend_from_slice(&labeled.coords);
    points
}

fn real_values(mat: &MatFile, name: &str) -> PinnResult<Vec<f64>> {
    let array = mat
        .find_by_name(name)
        .ok_or_else(|| PinnError::MalformedInput(format!("変数 '{name}' がありません")))?;
    let values = match array.data() {
        NumericData::Double { real, .. } => real.clone(),
        NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(PinnError::MalformedInput(format!(
                "変数 '{name}' は浮動小数点数ではありません"
            )));
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiny() -> BurgersData {
        // u(x, t) = 10 * i_t + i_x
        let x = vec![-1.0, 0.0, 1.0];
        let t = vec![0.0, 0.5, 1.0, 1.5];
        let exact = (0..4)
            .flat_map(|i| (0..3).map(move |j| (10 * i + j) as f64))
            .collect();
        BurgersData::from_grid(x, t, exact).unwrap()
    }

    #[test]
    fn grid_points_follow_exact_layout() {
        let data = tiny();
        let grid = data.grid_points();
        assert_eq!(grid.len(), 12);
        assert_eq!(grid[0], [-1.0, 0.0]);
        assert_eq!(grid[4], [0.0, 0.5]);
        assert_eq!(data.at(1, 1), 11.0);
    }

    #[test]
    fn boundary_pool_takes_initial_row_and_side_columns() {
        let samples = tiny().boundary_samples();

        assert_eq!(samples.len(), 3 + 2 * 4);
        assert_eq!(&samples.values[..3], &[0.0, 1.0, 2.0]);
        assert_eq!(&samples.values[3..7], &[0.0, 10.0, 20.0, 30.0]);
        assert_eq!(&samples.values[7..], &[2.0, 12.0, 22.0, 32.0]);
        assert_eq!(samples.coords[9], [1.0, 1.0]);
    }

    #[test]
    fn domain_spans_grid() {
        let domain = tiny().domain().unwrap();
        assert_eq!(domain.lower(), [-1.0, 0.0]);
        assert_eq!(domain.upper(), [1.0, 1.5]);
    }

    #[test]
    fn mismatched_solution_is_rejected() {
        let result = BurgersData::from_grid(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0; 3]);
        assert!(matches!(result, Err(PinnError::ShapeMismatch { .. })));
    }

    #[test]
    fn choose_is_without_replacement() {
        let mut rng = StdRng::seed_from_u64(1234);
        let pool = tiny().boundary_samples();
        let mut pool_ids = LabeledSamples::default();
        for (i, coord) in pool.coords.iter().enumerate() {
            pool_ids.push(*coord, i as f64);
        }

        let chosen = pool_ids.choose(8, &mut rng).unwrap();

        let mut ids: Vec<usize> = chosen.values.iter().map(|v| *v as usize).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert!(pool_ids.choose(pool_ids.len() + 1, &mut rng).is_err());
    }

    #[test]
    fn latin_hypercube_fills_every_stratum_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 50;

        let points = latin_hypercube(n, &mut rng);

        assert_eq!(points.len(), n);
        for dim in 0..2 {
            let mut strata: Vec<usize> = points.iter().map(|p| (p[dim] * n as f64) as usize).collect();
            strata.sort_unstable();
            assert_eq!(strata, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn collocation_points_stay_in_domain_and_append_labeled() {
        let mut rng = StdRng::seed_from_u64(99);
        let data = tiny();
        let domain = data.domain().unwrap();
        let labeled = data.boundary_samples().choose(5, &mut rng).unwrap();

        let points = collocation_points(200, &domain, &labeled, &mut rng);

        assert_eq!(points.len(), 205);
        assert_eq!(&points[200..], labeled.coords.as_slice());
        let (lb, ub) = (domain.lower(), domain.upper());
        assert!(points.iter().all(|p| (0..2).all(|i| lb[i] <= p[i] && p[i] <= ub[i])));
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    // フィクスチャは x = [-1, 0, 1], t = [0, 0.5], usol(j, i) = 10 i + j + 0.25 (3 × 2)
    #[test]
    fn load_reads_column_major_usol_as_time_rows() {
        let data = BurgersData::load(fixture("grid_double.mat")).unwrap();

        assert_eq!(data.x, vec![-1.0, 0.0, 1.0]);
        assert_eq!(data.t, vec![0.0, 0.5]);
        assert_eq!((data.nx(), data.nt()), (3, 2));
        for i_t in 0..2 {
            for i_x in 0..3 {
                assert_eq!(data.at(i_t, i_x), 10.0 * i_t as f64 + i_x as f64 + 0.25);
            }
        }
    }

    #[test]
    fn load_accepts_single_precision() {
        let single = BurgersData::load(fixture("grid_single.mat")).unwrap();
        let double = BurgersData::load(fixture("grid_double.mat")).unwrap();
        assert_eq!(single.exact, double.exact);
    }

    #[test]
    fn load_rejects_transposed_usol() {
        let result = BurgersData::load(fixture("usol_transposed.mat"));
        assert!(matches!(result, Err(PinnError::MalformedInput(_))));
    }

    #[test]
    fn load_rejects_integer_usol() {
        let result = BurgersData::load(fixture("usol_integer.mat"));
        assert!(matches!(result, Err(PinnError::MalformedInput(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = BurgersData::load("does/not/exist.mat");
        assert!(matches!(result, Err(PinnError::Io(_))));
    }
}
