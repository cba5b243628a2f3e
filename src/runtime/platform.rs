use std::sync::OnceLock;

/// Thin host abstraction for everything the engine asks of its
/// surroundings: the clock, thread sleep, and module source bytes.
/// Call sites go through [`platform()`] so a host can swap the
/// implementation in before first use.
pub trait Platform: Send + Sync {
    fn now_secs(&self) -> i64;
    fn sleep_ms(&self, millis: i64);
    fn read_source(&self, path: &str) -> Result<String, String>;
}

pub struct StdPlatform;

impl Platform for StdPlatform {
    fn now_secs(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn sleep_ms(&self, millis: i64) {
        if millis > 0 {
            std::thread::sleep(std::time::Duration::from_millis(millis as u64));
        }
    }

    fn read_source(&self, path: &str) -> Result<String, String> {
        std::fs::read_to_string(path).map_err(|err| err.to_string())
    }
}

static PLATFORM: OnceLock<Box<dyn Platform>> = OnceLock::new();

pub fn platform() -> &'static dyn Platform {
    PLATFORM.get_or_init(|| Box::new(StdPlatform)).as_ref()
}

/// Installs a host platform; fails if one is already in use.
pub fn install_platform<P: Platform + 'static>(platform: P) -> Result<(), Box<dyn Platform>> {
    PLATFORM.set(Box::new(platform))
}
