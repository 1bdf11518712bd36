// Calldesk Library
// Call session tracking and contact reconciliation for the contacts screen,
// shared by the mobile shell and the CLI binary

pub mod calllog;
pub mod clock;
pub mod config;
pub mod contacts;
pub mod feed;
pub mod leads;
pub mod lifecycle;
pub mod logging;
pub mod notice;
pub mod phone;
pub mod screen;
pub mod session;

// Re-export commonly used types for the CLI and platform shells
pub use calllog::{
    CallDirection, CallLogEntry, CallLogLoad, CallLogPlatform, CallLogSource, PermissionRationale,
    RawCallRow, correlate, DEFAULT_CALL_LOG_LIMIT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ScreenConfig, get_app_data_dir, init_app_data_dir, preferences_path};
pub use contacts::{
    ContactDirectoryLoader, ContactLoad, ContactRecord, ContactsPlatform, EmailEntry, PhoneEntry,
    sort_by_display_name,
};
pub use feed::{Feed, FeedItem, FeedSources, FeedTab, RecentItem, RenderContract, item_key, select_feed};
pub use leads::{
    FetchLeadsRequest, HttpLeadsApi, LeadError, LeadRecord, LeadSource, LeadStatus, LeadsApi,
    SessionTokenProvider, StaticTokenProvider,
};
pub use lifecycle::{AppState, LifecycleObserver, Subscription};
pub use notice::{Notice, PermissionScope, PermissionStatus, PlatformError};
pub use phone::{digits_only, normalize_digits, numbers_match, tel_target};
pub use screen::{ContactsScreen, ScreenDeps};
pub use session::{
    CallSession, CallSessionTracker, ContactType, DialError, DialOutcome, DialTarget, Dialer,
    OpenSessionPolicy, PartyRef, SessionStatus, HISTORY_CAPACITY, elapsed_secs,
};
