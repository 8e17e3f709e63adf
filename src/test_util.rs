use std::sync::Mutex;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Run `func` with `HOME` pointing at a fresh temp dir.
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|err| err.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    set_env("HOME", Some(dir.path().to_string_lossy().as_ref()));
    let result = func(dir.path());
    set_env("HOME", old_home.as_deref());
    result
}

/// Run `func` with the given variables set (or removed when `None`).
pub(crate) fn with_env<F, R>(vars: &[(&str, Option<&str>)], func: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|err| err.into_inner());
    let saved = vars
        .iter()
        .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
        .collect::<Vec<_>>();
    for (key, value) in vars {
        set_env(key, *value);
    }
    let result = func();
    for (key, value) in saved {
        set_env(&key, value.as_deref());
    }
    result
}

fn set_env(key: &str, value: Option<&str>) {
    // Callers hold ENV_MUTEX.
    unsafe {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}
