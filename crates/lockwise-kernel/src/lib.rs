//! Lockwise kernel.
//!
//! The pieces every other Lockwise crate agrees on:
//!
//! - **[`action`]** -- The closed [`Action`] enum that flows over the bus.
//!   Lifecycle, user interaction, settings, data store, account and
//!   credential-provider requests each get their own sub-enum so listeners
//!   match only what they care about.
//! - **[`bus`]** -- A typed publish/subscribe [`Bus`] backed by
//!   [`tokio::sync::broadcast`].
//! - **[`clock`]** -- The [`Clock`] seam used for every deadline computation,
//!   with a real [`SystemClock`] and a settable [`ManualClock`] for tests.
//! - **[`setting`]** -- The [`AutoLockSetting`] durations.
//! - **[`error`]** -- Kernel error types via [`thiserror`].

pub mod action;
pub mod bus;
pub mod clock;
pub mod error;
pub mod setting;

pub use action::{
    AccountAction, Action, CopyField, CredentialProviderAction, DataStoreAction, LifecycleEvent,
    LoginRoute, MainRoute, RouteAction, SettingChangedEvent, SettingRoute, UserInteractionEvent,
};
pub use bus::{ActionBus, Bus, BusReceiver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{KernelError, Result};
pub use setting::AutoLockSetting;
