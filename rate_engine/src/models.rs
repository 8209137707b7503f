pub mod arima;
pub mod garch;
pub(crate) mod optim;
pub mod short_rate;
