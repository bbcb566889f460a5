//! Verdict classification of engine diagnostics.
//!
//! `rpmkeys --checksig --verbose` prints a header line naming the package,
//! then one line per digest or signature:
//!
//! ```text
//! /var/cache/pkgs/hello-2.12-1.x86_64.rpm:
//!     Header V4 RSA/SHA256 Signature, key ID fd431d51: NOKEY
//!     Header SHA256 digest: OK
//!     Payload SHA256 digest: OK
//! ```

use super::Verdict;

const BAD: &str = ": BAD";
const NOKEY: &str = ": NOKEY";
const NOTTRUSTED: &str = ": NOTTRUSTED";
const NOTFOUND: &str = ": NOTFOUND";
const OK: &str = ": OK";

/// Classify the lines captured while checking `package_path`.
///
/// Only meaningful when the engine reported failure. A `BAD` line or any
/// unrecognized line yields [`Verdict::Failed`] immediately. Otherwise the
/// most severe recorded condition wins: not trusted, then missing key, then
/// not signed. When every line reads `OK` the result is still
/// [`Verdict::Failed`].
///
/// # Examples
///
/// ```
/// use pkg_trust::{classify, Verdict};
///
/// let lines = [
///     "/tmp/hello.rpm:",
///     "    Header V4 RSA/SHA256 Signature, key ID fd431d51: NOKEY",
///     "    Header SHA256 digest: OK",
/// ];
/// assert_eq!(classify("/tmp/hello.rpm", &lines), Verdict::FailedKeyMissing);
/// ```
pub fn classify<S: AsRef<str>>(package_path: &str, lines: &[S]) -> Verdict {
    let mut missing_key = false;
    let mut not_trusted = false;
    let mut not_signed = false;

    for line in lines {
        let line = line.as_ref();
        if line.starts_with(package_path) {
            continue;
        }

        if line.contains(BAD) {
            return Verdict::Failed;
        } else if line.ends_with(NOKEY) {
            missing_key = true;
        } else if line.ends_with(NOTTRUSTED) {
            not_trusted = true;
        } else if line.ends_with(NOTFOUND) {
            not_signed = true;
        } else if !line.ends_with(OK) {
            return Verdict::Failed;
        }
    }

    if not_trusted {
        Verdict::FailedNotTrusted
    } else if missing_key {
        Verdict::FailedKeyMissing
    } else if not_signed {
        Verdict::FailedNotSigned
    } else {
        Verdict::Failed
    }
}
