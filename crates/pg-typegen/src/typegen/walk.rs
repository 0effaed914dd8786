use std::{
  fs,
  path::{Path, PathBuf},
};

use anyhow::Context;
use regex::Regex;

/// Translates a glob pattern (`*`, `**`, `?`) into an anchored regex over
/// `/`-separated relative paths.
fn glob_to_regex(pattern: &str) -> anyhow::Result<Regex> {
  let mut re = String::from("^");
  let mut chars = pattern.chars().peekable();
  while let Some(ch) = chars.next() {
    match ch {
      '*' => {
        if chars.peek() == Some(&'*') {
          chars.next();
          // `**/` also matches the empty prefix
          if chars.peek() == Some(&'/') {
            chars.next();
            re.push_str("(?:.*/)?");
          } else {
            re.push_str(".*");
          }
        } else {
          re.push_str("[^/]*");
        }
      }
      '?' => re.push_str("[^/]"),
      '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
        re.push('\\');
        re.push(ch);
      }
      other => re.push(other),
    }
  }
  re.push('$');
  Regex::new(&re).with_context(|| format!("invalid glob pattern {pattern:?}"))
}

pub struct FileMatcher {
  include: Vec<Regex>,
  exclude: Vec<Regex>,
}

impl FileMatcher {
  pub fn new(include: &[String], exclude: &[String]) -> anyhow::Result<Self> {
    Ok(Self {
      include: include.iter().map(|p| glob_to_regex(p)).collect::<anyhow::Result<_>>()?,
      exclude: exclude.iter().map(|p| glob_to_regex(p)).collect::<anyhow::Result<_>>()?,
    })
  }

  pub fn matches(&self, relative: &str) -> bool {
    self.include.iter().any(|re| re.is_match(relative)) && !self.exclude.iter().any(|re| re.is_match(relative))
  }
}

/// Collects candidate source files under `root`, in sorted order so every
/// run processes files deterministically.
pub fn collect_files(root: &Path, include: &[String], exclude: &[String]) -> anyhow::Result<Vec<PathBuf>> {
  let matcher = FileMatcher::new(include, exclude)?;
  let mut files = Vec::new();
  walk_dir(root, root, &matcher, &mut files)?;
  files.sort();
  Ok(files)
}

fn walk_dir(root: &Path, dir: &Path, matcher: &FileMatcher, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
  let entries = fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;
  for entry in entries {
    let entry = entry?;
    let path = entry.path();
    // Symlinks are skipped entirely: a link pointing back into the tree
    // would otherwise recurse without end.
    if entry.file_type()?.is_symlink() {
      continue;
    }
    let relative = relative_slash_path(root, &path);
    if path.is_dir() {
      // Prune whole directories the exclude set can never reach into.
      if matcher.exclude.iter().any(|re| re.is_match(&format!("{relative}/"))) {
        continue;
      }
      walk_dir(root, &path, matcher, out)?;
    } else if matcher.matches(&relative) {
      out.push(path);
    }
  }
  Ok(())
}

pub fn relative_slash_path(root: &Path, path: &Path) -> String {
  let relative = path.strip_prefix(root).unwrap_or(path);
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect::<Vec<_>>()
    .join("/")
}
