use std::{borrow::Cow, env};

// `:` is deliberately absent: tags are `key:value` pairs.
const RESERVED_TAG_CHARS: [char; 3] = ['\n', '|', ','];

/// How tags containing protocol separator characters are handled.
///
/// A newline, pipe, or comma inside a tag corrupts the line it is emitted on, and
/// potentially every other line batched into the same packet. The client either strips
/// the offending characters or refuses the operation outright, depending on this
/// setting.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TagPolicy {
    /// Strip the offending characters and emit the remainder of the tag.
    #[default]
    Sanitize,

    /// Fail the operation that carried the tag.
    Reject,
}

pub(crate) fn is_clean(tag: &str) -> bool {
    !tag.contains(&RESERVED_TAG_CHARS[..])
}

pub(crate) fn sanitize(tag: &str) -> String {
    tag.chars().filter(|c| !RESERVED_TAG_CHARS.contains(c)).collect()
}

/// Applies the configured tag policy to a set of per-call tags.
///
/// Clean tags are passed through without copying. Returns the first offending tag
/// when the policy is [`TagPolicy::Reject`].
pub(crate) fn apply_policy<'a>(
    tags: &[&'a str],
    policy: TagPolicy,
) -> Result<Vec<Cow<'a, str>>, String> {
    let mut out = Vec::with_capacity(tags.len());
    for &tag in tags {
        if is_clean(tag) {
            out.push(Cow::Borrowed(tag));
        } else {
            match policy {
                TagPolicy::Sanitize => out.push(Cow::Owned(sanitize(tag))),
                TagPolicy::Reject => return Err(tag.to_string()),
            }
        }
    }
    Ok(out)
}

/// Builds the default global tag set: a single `binary:<name>` tag derived from the
/// running executable, or an empty set when the executable path cannot be read.
pub(crate) fn default_tags() -> Vec<String> {
    let Ok(path) = env::current_exe() else {
        return Vec::new();
    };
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => vec![format!("binary:{}", name.replace(' ', "_"))],
        None => Vec::new(),
    }
}
