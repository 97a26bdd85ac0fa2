use std::path::PathBuf;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/chibitv/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("chibitv")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chibitv")
    }
}

pub fn config_dir() -> PathBuf {
    // On Windows, check for portable config.toml in executable directory first
    #[cfg(windows)]
    {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                if exe_dir.join("config.toml").exists() {
                    return exe_dir.to_path_buf();
                }
            }
        }
    }

    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("chibitv")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chibitv")
    }
}

/// Socket (unix) or pipe name (windows) for one mpv IPC server.  Each player
/// instance gets its own so a releasing process never shares a socket with
/// its replacement.
#[cfg(unix)]
pub fn mpv_socket_name(instance: u64) -> String {
    format!(
        "{}/chibitv-mpv-{}-{}.sock",
        std::env::temp_dir().display(),
        std::process::id(),
        instance
    )
}

#[cfg(windows)]
pub fn mpv_socket_name(instance: u64) -> String {
    format!("chibitv-mpv-{}-{}", std::process::id(), instance)
}

#[cfg(unix)]
pub fn mpv_socket_arg(instance: u64) -> String {
    format!("--input-ipc-server={}", mpv_socket_name(instance))
}

#[cfg(windows)]
pub fn mpv_socket_arg(instance: u64) -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name(instance))
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

/// Find mpv: beside the executable first, then on PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    let exe_name = mpv_binary_name();

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join(exe_name);
            if local_mpv.exists() {
                return Some(local_mpv);
            }
        }
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(exe_name))
        .find(|candidate| candidate.exists())
}

/// Whether a graphical display is reachable for a video window.
#[cfg(all(unix, not(target_os = "macos")))]
pub fn has_display() -> bool {
    std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
}

#[cfg(any(windows, target_os = "macos"))]
pub fn has_display() -> bool {
    true
}
