use tokio::sync::Mutex as AsyncMutex;

/// Serializes tests that touch process environment variables.
/// Sync tests take it with `.blocking_lock()`, async tests with `.lock().await`.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Removes the listed variables now and again on drop, so a failing
/// assertion cannot leak settings into the next test holding `ENV_LOCK`.
pub struct ScrubbedEnv {
    keys: Vec<&'static str>,
}

impl ScrubbedEnv {
    pub fn new(keys: &[&'static str]) -> Self {
        for key in keys {
            std::env::remove_var(key);
        }
        Self {
            keys: keys.to_vec(),
        }
    }
}

impl Drop for ScrubbedEnv {
    fn drop(&mut self) {
        for key in &self.keys {
            std::env::remove_var(key);
        }
    }
}
