use git_version::git_version;
use target_info::Target;

/// Returns the current version of this build of the keyshare daemon.
///
/// A plus-sign (`+`) is appended to the git commit if the tree is dirty.
///
/// ## Example
///
/// `Keyshare/v0.1.0-67da032+`
pub const VERSION: &str = git_version!(
    args = [
        "--always",
        "--dirty=+",
        "--abbrev=7",
        // NOTE: using --match instead of --exclude for compatibility with old Git
        "--match=thiswillnevermatchlol"
    ],
    prefix = "Keyshare/v0.1.0-",
    fallback = "Keyshare/v0.1.0"
);

/// Returns `VERSION`, but with platform information appended to the end.
///
/// ## Example
///
/// `Keyshare/v0.1.0-67da032+/x86_64-linux`
pub fn version_with_platform() -> String {
    format!("{}/{}-{}", VERSION, Target::arch(), Target::os())
}
