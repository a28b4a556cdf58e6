use ib_core::{config::validate_flag, BridgeError, EngineConfig};
use once_cell::sync::OnceCell;
use tracing::debug;

static PLATFORM: OnceCell<()> = OnceCell::new();

/// Applies the configured flags and brings up the process-wide engine
/// platform. Succeeds exactly once per process.
pub fn initialize(config: &EngineConfig) -> Result<(), BridgeError> {
    config.validate()?;
    if is_initialized() {
        return Err(BridgeError::AlreadyInitialized);
    }

    let mut initialized_here = false;
    PLATFORM.get_or_init(|| {
        if !config.flags.is_empty() {
            v8::V8::set_flags_from_string(&config.flag_string());
        }
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform);
        v8::V8::initialize();
        initialized_here = true;
    });

    if !initialized_here {
        return Err(BridgeError::AlreadyInitialized);
    }
    debug!(version = version(), flags = %config.flag_string(), "engine platform initialized");
    Ok(())
}

/// Sets engine flags from a space-separated string. Only valid before
/// [`initialize`].
pub fn set_flags(flags: &str) -> Result<(), BridgeError> {
    if is_initialized() {
        return Err(BridgeError::FlagsAfterInitialize);
    }
    for flag in flags.split_whitespace() {
        validate_flag(flag)?;
    }
    v8::V8::set_flags_from_string(flags);
    Ok(())
}

pub fn is_initialized() -> bool {
    PLATFORM.get().is_some()
}

pub fn version() -> &'static str {
    v8::V8::get_version()
}

pub(crate) fn ensure_initialized() -> Result<(), BridgeError> {
    if is_initialized() {
        Ok(())
    } else {
        Err(BridgeError::NotInitialized)
    }
}
