//! Built-in smoke suite for the bindfs service.
//!
//! Each case mounts `src` onto `mnt` with a set of bindfs options and checks
//! the effect through the mount point.

use std::ffi::CString;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};
use std::path::Path;

use mountcheck_harness::{CaseContext, TestCase, VerifyError, check, check_eq, expect_errno};

/// Uid and gid the ownership cases map files to.
#[derive(Debug, Clone, Copy)]
struct Nobody {
    uid: u32,
    gid: u32,
}

fn user_id(name: &str) -> Option<u32> {
    let name = CString::new(name).ok()?;
    // SAFETY: name is NUL-terminated; the returned record is only read
    // before any other passwd call on this thread.
    let pw = unsafe { libc::getpwnam(name.as_ptr()) };
    if pw.is_null() {
        None
    } else {
        // SAFETY: non-null pointer returned by getpwnam.
        Some(unsafe { (*pw).pw_uid })
    }
}

fn group_id(name: &str) -> Option<u32> {
    let name = CString::new(name).ok()?;
    // SAFETY: as in `user_id`.
    let gr = unsafe { libc::getgrnam(name.as_ptr()) };
    if gr.is_null() {
        None
    } else {
        // SAFETY: non-null pointer returned by getgrnam.
        Some(unsafe { (*gr).gr_gid })
    }
}

fn nobody() -> Option<Nobody> {
    Some(Nobody {
        uid: user_id("nobody")?,
        gid: group_id("nogroup")?,
    })
}

fn missing_nobody() -> Option<String> {
    nobody()
        .is_none()
        .then(|| "user nobody or group nogroup missing".to_owned())
}

fn nobody_or_fail() -> Result<Nobody, VerifyError> {
    nobody().ok_or_else(|| VerifyError::Assertion("user nobody or group nogroup missing".to_owned()))
}

fn touch(path: &Path) -> io::Result<()> {
    File::create(path).map(drop)
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

fn mode(path: &Path) -> io::Result<u32> {
    Ok(fs::metadata(path)?.mode())
}

fn current_uid() -> u32 {
    // SAFETY: getuid cannot fail.
    unsafe { libc::getuid() }
}

/// What a chown/chgrp attempt through the mount should do.
#[derive(Debug, Clone, Copy)]
enum Expect {
    /// Owner changes.
    Uid,
    /// Group changes.
    Gid,
    /// Both change.
    Both,
    /// Silently nothing changes.
    Neither,
    /// Refused with EPERM.
    Denied,
}

/// Which ownership change is attempted.
#[derive(Debug, Clone, Copy)]
enum Change {
    Owner,
    Group,
    Both,
}

impl Change {
    fn label(self) -> &'static str {
        match self {
            Self::Owner => "chown",
            Self::Group => "chgrp",
            Self::Both => "chown+chgrp",
        }
    }

    fn apply(self, path: &Path, nobody: Nobody) -> io::Result<()> {
        match self {
            Self::Owner => chown(path, Some(nobody.uid), None),
            Self::Group => chown(path, None, Some(nobody.gid)),
            Self::Both => chown(path, Some(nobody.uid), Some(nobody.gid)),
        }
    }
}

fn ownership_case(flags: &str, change: Change, expect: Expect) -> TestCase {
    TestCase::root(flags, move |ctx| {
        let nobody = nobody_or_fail()?;
        let src = ctx.src("file");
        let mnt = ctx.mnt("file");
        touch(&src)?;

        if let Expect::Denied = expect {
            return expect_errno(libc::EPERM, || change.apply(&mnt, nobody));
        }
        change.apply(&mnt, nobody)?;

        let meta = fs::metadata(&src)?;
        let (uid_changed, gid_changed) = (meta.uid() == nobody.uid, meta.gid() == nobody.gid);
        let want = match expect {
            Expect::Uid => (true, false),
            Expect::Gid => (false, true),
            Expect::Both => (true, true),
            Expect::Neither | Expect::Denied => (false, false),
        };
        check_eq((uid_changed, gid_changed), want, "(uid changed, gid changed)")
    })
    .with_title(format!("{flags} ({})", change.label()))
    .skip_if(missing_nobody)
}

fn ownership_matrix() -> Vec<TestCase> {
    use Expect::{Both, Denied, Gid, Neither, Uid};

    let table: [(&str, &str, [Expect; 3]); 9] = [
        ("--chown-normal", "--chgrp-normal", [Uid, Gid, Both]),
        ("--chown-normal", "--chgrp-ignore", [Uid, Neither, Uid]),
        ("--chown-normal", "--chgrp-deny", [Uid, Denied, Denied]),
        ("--chown-ignore", "--chgrp-normal", [Neither, Gid, Gid]),
        ("--chown-ignore", "--chgrp-ignore", [Neither, Neither, Neither]),
        ("--chown-ignore", "--chgrp-deny", [Neither, Denied, Denied]),
        ("--chown-deny", "--chgrp-normal", [Denied, Gid, Denied]),
        ("--chown-deny", "--chgrp-ignore", [Denied, Neither, Denied]),
        ("--chown-deny", "--chgrp-deny", [Denied, Denied, Denied]),
    ];

    table
        .iter()
        .flat_map(|(chown_flag, chgrp_flag, expectations)| {
            let flags = format!("{chown_flag} {chgrp_flag}");
            [Change::Owner, Change::Group, Change::Both]
                .into_iter()
                .zip(*expectations)
                .map(move |(change, expect)| ownership_case(&flags, change, expect))
        })
        .collect()
}

/// The built-in cases, in run order.
pub fn builtin_cases() -> Vec<TestCase> {
    let mut cases = vec![
        TestCase::new("", |ctx: &CaseContext| {
            check(ctx.mnt_dir().is_dir(), "mount point is not a directory")?;
            fs::write(ctx.src("file"), "hello")?;
            check_eq(
                fs::read_to_string(ctx.mnt("file"))?,
                "hello".to_owned(),
                "contents seen through the mount",
            )
        }),
        TestCase::root("-u nobody -g nogroup", |ctx| {
            let nobody = nobody_or_fail()?;
            touch(&ctx.src("file"))?;
            let meta = fs::metadata(ctx.mnt("file"))?;
            check_eq(meta.uid(), nobody.uid, "owner")?;
            check_eq(meta.gid(), nobody.gid, "group")
        })
        .skip_if(missing_nobody),
        TestCase::new("-p 0600:u+D", |ctx| {
            touch(&ctx.src("file"))?;
            set_mode(&ctx.src("file"), 0o777)?;
            check_eq(mode(&ctx.mnt("file"))? & 0o777, 0o600, "mode")
        }),
        TestCase::new("--chmod-deny", |ctx| {
            touch(&ctx.src("file"))?;
            expect_errno(libc::EPERM, || set_mode(&ctx.mnt("file"), 0o777))
        }),
        TestCase::new(format!("-u nobody -m {} -p 0600,u+D", current_uid()), |ctx| {
            touch(&ctx.src("file"))?;
            check_eq(fs::metadata(ctx.mnt("file"))?.uid(), current_uid(), "owner")
        })
        .skip_if(missing_nobody),
        TestCase::new("--create-with-perms=og=r:ogd+x", |ctx| {
            touch(&ctx.mnt("file"))?;
            fs::create_dir(ctx.mnt("dir"))?;
            check_eq(mode(&ctx.src("file"))? & 0o077, 0o044, "file mode")?;
            check_eq(mode(&ctx.src("dir"))? & 0o077, 0o055, "dir mode")
        }),
        TestCase::new("--chmod-allow-x --chmod-ignore", |ctx| {
            touch(&ctx.src("file"))?;
            set_mode(&ctx.src("file"), 0o1700)?;
            // only the x bits may change, and the sticky bit stays
            set_mode(&ctx.mnt("file"), 0o0077)?;
            check_eq(mode(&ctx.src("file"))? & 0o7777, 0o1611, "file mode")?;

            fs::create_dir(ctx.src("dir"))?;
            set_mode(&ctx.src("dir"), 0o700)?;
            set_mode(&ctx.mnt("dir"), 0o077)?;
            check_eq(mode(&ctx.src("dir"))? & 0o777, 0o700, "dir mode")
        }),
        TestCase::new("--chmod-deny --chmod-allow-x", |ctx| {
            let (src, mnt) = (ctx.src("file"), ctx.mnt("file"));
            touch(&src)?;
            set_mode(&src, 0o700)?;
            set_mode(&mnt, 0o700)?;

            expect_errno(libc::EPERM, || set_mode(&mnt, 0o777))?;
            expect_errno(libc::EPERM, || set_mode(&mnt, 0o000))?;
            expect_errno(libc::EPERM, || set_mode(&mnt, 0o1700))?;

            set_mode(&mnt, 0o611)?;
            check_eq(mode(&src)? & 0o7777, 0o611, "file mode")?;

            fs::create_dir(ctx.src("dir"))?;
            set_mode(&ctx.src("dir"), 0o700)?;
            expect_errno(libc::EPERM, || set_mode(&ctx.mnt("dir"), 0o700))
        }),
        TestCase::root("--chown-deny", |ctx| {
            let nobody = nobody_or_fail()?;
            let mnt = ctx.mnt("file");
            touch(&ctx.src("file"))?;
            expect_errno(libc::EPERM, || chown(&mnt, Some(nobody.uid), None))?;
            expect_errno(libc::EPERM, || chown(&mnt, Some(nobody.uid), Some(nobody.gid)))?;
            chown(&mnt, None, Some(nobody.gid))?;
            Ok(())
        })
        .skip_if(missing_nobody),
    ];
    cases.extend(ownership_matrix());
    cases
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn titles_are_unique() {
        let cases = builtin_cases();
        let titles: HashSet<&str> = cases.iter().map(TestCase::title).collect();
        assert_eq!(titles.len(), cases.len());
    }

    #[test]
    fn matrix_covers_every_flag_pair_and_change() {
        let matrix = ownership_matrix();
        assert_eq!(matrix.len(), 27);
        assert!(
            matrix
                .iter()
                .any(|c| c.title() == "--chown-deny --chgrp-ignore (chgrp)")
        );
        assert!(matrix.iter().all(|c| c.args().starts_with("--chown-")));
    }

    #[test]
    fn smoke_case_comes_first() {
        assert_eq!(builtin_cases()[0].title(), "");
    }

    #[test]
    fn root_lookup_works() {
        assert_eq!(user_id("root"), Some(0));
        assert_eq!(user_id("no-such-user-for-mountcheck"), None);
    }
}
