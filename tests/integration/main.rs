//! Integration tests: estimators, factory and history against mock backends.

mod mock_provider;
mod pipeline;
mod providers;
