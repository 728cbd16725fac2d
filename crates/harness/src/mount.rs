//! Mount-table queries and unmounting.
//!
//! The [`MountPlatform`] trait abstracts the two OS interactions the harness
//! needs around a mount point, so that production code uses
//! [`SystemMounts`] while tests substitute a recording fake.
//!
//! # Platform behaviour
//!
//! - Linux: the mount table is read from `/proc/self/mounts`; unmounting
//!   uses `fusermount -uz` when `fusermount` (or `fusermount3`) is on
//!   `PATH`, and `umount` otherwise.
//! - Other systems: the output of `mount` is searched for `" on <path> "`
//!   and `umount` is used.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

/// OS operations on a mount point.
pub trait MountPlatform {
    /// Whether `path` currently appears in the mount table.
    fn is_mounted(&self, path: &Path) -> io::Result<bool>;

    /// Unmount `path`. The error string describes why it failed.
    fn unmount(&self, path: &Path) -> Result<(), String>;
}

/// The unmount program and its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmountCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl UnmountCommand {
    /// Choose the unmount command for this platform.
    pub fn detect() -> Self {
        if cfg!(target_os = "linux") {
            for name in ["fusermount", "fusermount3"] {
                if let Some(path) = find_in_path(name) {
                    return Self {
                        program: path,
                        args: vec!["-uz".into()],
                    };
                }
            }
        }
        Self {
            program: PathBuf::from("umount"),
            args: Vec::new(),
        }
    }

    fn run(&self, path: &Path) -> Result<(), String> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| format!("{} could not be run: {e}", self.program.display()))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{} failed with {status}", self.program.display()))
        }
    }
}

/// The real mount table and unmount command.
#[derive(Debug, Clone)]
pub struct SystemMounts {
    unmount: UnmountCommand,
}

impl SystemMounts {
    pub fn new() -> Self {
        Self {
            unmount: UnmountCommand::detect(),
        }
    }

    pub fn unmount_command(&self) -> &UnmountCommand {
        &self.unmount
    }
}

impl Default for SystemMounts {
    fn default() -> Self {
        Self::new()
    }
}

impl MountPlatform for SystemMounts {
    fn is_mounted(&self, path: &Path) -> io::Result<bool> {
        if cfg!(target_os = "linux") {
            let table = std::fs::read_to_string("/proc/self/mounts")?;
            Ok(proc_mounts_contains(&table, path))
        } else {
            let output = Command::new("mount").stdin(Stdio::null()).output()?;
            if !output.status.success() {
                return Err(io::Error::other(format!(
                    "mount exited with {}",
                    output.status
                )));
            }
            let needle = format!(" on {} ", path.display());
            Ok(String::from_utf8_lossy(&output.stdout).contains(&needle))
        }
    }

    fn unmount(&self, path: &Path) -> Result<(), String> {
        debug!(path = %path.display(), program = %self.unmount.program.display(), "unmounting");
        self.unmount.run(path)
    }
}

/// Whether a `/proc/self/mounts`-formatted table has `path` as a mount point.
pub fn proc_mounts_contains(table: &str, path: &Path) -> bool {
    let wanted = path.to_string_lossy();
    table
        .lines()
        .filter_map(|line| line.split(' ').nth(1))
        .any(|mount_point| unescape_mount_field(mount_point) == wanted)
}

/// Decode the octal escapes (`\040`, `\011`, `\012`, `\134`) the kernel
/// uses for whitespace and backslashes in mount table fields.
pub fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
bindfs /tmp/work/tmp_test_bindfs/mnt fuse.bindfs rw,nosuid,nodev,relatime,user_id=0 0 0
bindfs /tmp/work/tmp_test_bindfs/mount\\040point\\012x fuse.bindfs rw 0 0
";

    #[test]
    fn finds_plain_mount_point() {
        assert!(proc_mounts_contains(
            TABLE,
            Path::new("/tmp/work/tmp_test_bindfs/mnt")
        ));
    }

    #[test]
    fn does_not_match_prefixes() {
        assert!(!proc_mounts_contains(
            TABLE,
            Path::new("/tmp/work/tmp_test_bindfs")
        ));
        assert!(!proc_mounts_contains(
            TABLE,
            Path::new("/tmp/work/tmp_test_bindfs/mn")
        ));
    }

    #[test]
    fn decodes_escaped_whitespace() {
        assert!(proc_mounts_contains(
            TABLE,
            Path::new("/tmp/work/tmp_test_bindfs/mount point\nx")
        ));
    }

    #[test]
    fn unescape_leaves_non_octal_sequences() {
        assert_eq!(unescape_mount_field(r"a\x41"), r"a\x41");
        assert_eq!(unescape_mount_field(r"trail\04"), r"trail\04");
        assert_eq!(unescape_mount_field(r"back\134slash"), r"back\slash");
    }

    #[test]
    fn root_is_mounted_on_this_system() {
        if cfg!(target_os = "linux") {
            assert!(SystemMounts::new().is_mounted(Path::new("/")).unwrap());
        }
    }

    #[test]
    fn unmount_of_unmounted_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemMounts::new().unmount(dir.path());
        assert!(result.is_err());
    }
}
