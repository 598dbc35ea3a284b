//! # mutorch demo
//!
//! Walks through the engine end to end: a scalar expression and its gradients, then a tiny
//! least-squares fit driven by tensor broadcasting, `mean` and `backward`.
//!
//! Settings come from `MUTORCH_*` environment variables (see `mutorch_core::config`); log
//! verbosity from `RUST_LOG` (default `info`).

use std::error::Error;
use std::process::ExitCode;

use mutorch_core::config;
use mutorch_core::{Config, Graph, Parameters, Pow, ScalarNode, Tanh, Tensor};
use rand_distr::Uniform;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Step size for plain gradient descent
const LEARNING_RATE: f64 = 0.1;
/// Gradient descent steps for the linear fit
const NUM_STEPS: usize = 200;
/// Print loss every this many steps (and at step 0)
const LOSS_LOG_EVERY: usize = 25;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match config::from_env().and_then(|c| c.validate().map(|()| c)) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(?config, "starting");

    scalar_demo(&config);
    match fit_line(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "linear fit failed");
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// SCALARS: z = tanh(x * y + x^2)
// =============================================================================

fn scalar_demo(config: &Config) {
    let g = Graph::with_config(config);
    let x = g.leaf(0.5).with_name("x");
    let y = g.leaf(-1.5).with_name("y");
    let z = (&(&x * &y) + &(&x).pow(2.0)).tanh().with_name("z");
    z.backward();
    info!(%x, %y, %z, nodes = g.len(), "scalar backward");
}

// =============================================================================
// TENSORS: fit y = 2x - 1 with a (1, 1) weight and bias
// =============================================================================

fn fit_line(config: &Config) -> Result<(), Box<dyn Error>> {
    let g = Graph::with_config(config);
    let mut rng = config.rng();
    let init = Uniform::new(-1.0, 1.0)?;

    // The left operand decides whether a result tracks gradients, so inputs keep the default.
    let inputs = Tensor::new(&g, vec![vec![-1.0], vec![0.0], vec![1.0], vec![2.0]])?;
    let targets =
        Tensor::with_requires_grad(&g, vec![vec![-3.0], vec![-1.0], vec![1.0], vec![3.0]], false)?;
    let weight = Tensor::random(&g, &[1, 1], &init, &mut rng)?;
    let bias = Tensor::random(&g, &[1, 1], &init, &mut rng)?;
    let params = vec![weight.clone(), bias.clone()];
    info!(num_params = params.num_parameters(), %weight, %bias, "initialised");

    for step in 0..NUM_STEPS {
        let prediction = inputs.mul(&weight)?.add(&bias)?;
        let loss = prediction.sub(&targets)?.pow(2.0)?.mean()?;
        loss.zero_grad();
        loss.backward();

        for p in params.parameters() {
            if let Some(grad) = p.grad() {
                p.set_value(p.value() - LEARNING_RATE * grad);
            }
        }
        if step % LOSS_LOG_EVERY == 0 || step + 1 == NUM_STEPS {
            let loss = loss.item()?;
            info!(step, loss, "training");
        }
    }

    let (weight, bias) = (weight.item()?, bias.item()?);
    info!(weight, bias, nodes = g.len(), "fit complete");
    Ok(())
}
