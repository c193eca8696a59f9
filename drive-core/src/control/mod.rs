//! Dead-time compensated speed control.
//!
//! The traction loop is a PI controller wrapped around a Smith predictor. The
//! predictor keeps an undelayed copy of the identified plant
//! (`x' = -a x + a sat(u)`, output `phi(x)`) plus a delay line emulating the
//! actuator dead time, so the PI sees an estimate of the delay-free error:
//!
//! ```text
//! e = r - (y - phi(x_delayed) + phi(x))
//! u = phi_inv(r) + PI(e)
//! ```
//!
//! Feedforward through `phi_inv` carries the steady state; the PI only trims
//! model mismatch.

mod closed_loop;
mod nonlinearity;
mod pi;
mod predictor;

pub use closed_loop::{ClosedLoopController, TractionController};
pub use nonlinearity::{Identity, Nonlinearity, QuadraticNonlinearity};
pub use pi::PiController;
pub use predictor::{DelaySpec, InternalModelPredictor};
