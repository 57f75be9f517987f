//! HTTP handlers for the subset of the platform's API this core still
//! serves directly (§6): orders, payments, and provider automation.
//! Everything else named in §1 (billing CSV exports, analytics,
//! loyalty/referral, onboarding, instagram analytics) is out of scope.

pub mod automation;
pub mod auth;
pub mod health;
pub mod orders;
pub mod payments;
