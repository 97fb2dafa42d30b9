pub mod ports;
pub mod outreach_use_case;
pub mod dispatch_use_case;
