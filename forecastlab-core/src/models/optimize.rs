//! Derivative-free minimization (Nelder–Mead simplex).

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    pub max_iterations: usize,
    /// Stop once the spread of function values across the simplex falls below
    /// `tolerance * (1 + |f_best|)`.
    pub tolerance: f64,
    /// Offset of the initial simplex vertices from the start point.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-9,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `f` starting from `start`. Non-finite values are treated as +∞, so
/// the objective may return NaN outside its domain.
pub fn nelder_mead<F>(f: F, start: &[f64], config: NelderMeadConfig) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.to_vec());
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += config.initial_step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iterations {
        // Order vertices best → worst.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let spread = values[n] - values[0];
        if spread.is_finite() && spread <= config.tolerance * (1.0 + values[0].abs()) {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let towards = |coef: f64| -> Vec<f64> {
            (0..n)
                .map(|j| centroid[j] + coef * (simplex[n][j] - centroid[j]))
                .collect()
        };

        let reflected = towards(-REFLECTION);
        let f_reflected = eval(&reflected);

        if f_reflected < values[0] {
            let expanded = towards(-EXPANSION);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[n] {
            let c = towards(-CONTRACTION);
            let fc = eval(&c);
            (c, fc)
        } else {
            let c = towards(CONTRACTION);
            let fc = eval(&c);
            (c, fc)
        };
        if f_contracted < values[n].min(f_reflected) {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        let best = simplex[0].clone();
        for i in 1..=n {
            for j in 0..n {
                simplex[i][j] = best[j] + SHRINK * (simplex[i][j] - best[j]);
            }
            values[i] = eval(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}
