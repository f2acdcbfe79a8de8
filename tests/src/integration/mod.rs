//! Integration flows against stub upstream services.

pub mod flows;
pub mod forwarding;
