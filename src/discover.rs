//! Source file discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Config;

/// Directories never scanned, whatever the configuration says.
const ALWAYS_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "bower_components",
    "jspm_packages",
    "vendor",
    "dist",
    "build",
    "out",
    "coverage",
    "target",
    "tmp",
    "test",
    "tests",
    "__tests__",
    "__mocks__",
    "__fixtures__",
    "e2e",
    "cypress",
];

/// Test and declaration files carry no architecture.
fn is_test_or_declaration(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".d.ts")
        || [".test.", ".spec.", ".e2e.", ".stories."]
            .iter()
            .any(|marker| lower.contains(marker))
}

fn is_excluded_dir(name: &str) -> bool {
    (name.starts_with('.') && name.len() > 1) || ALWAYS_EXCLUDED_DIRS.contains(&name)
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every file under `root` matching the include globs and none of the
/// exclusions, sorted by path.
pub fn discover_files(root: &Path, config: &Config) -> anyhow::Result<Vec<PathBuf>> {
    let include = Config::glob_set(&config.include)?;
    let exclude = Config::glob_set(&config.exclude)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            // The root itself may be a dot directory.
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            !is_excluded_dir(&e.file_name().to_string_lossy())
        })
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if is_test_or_declaration(&name) {
            continue;
        }
        let rel = relative_path(root, path);
        if include.is_match(&rel) && !exclude.is_match(&rel) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export {};\n").unwrap();
    }

    fn discovered(root: &Path, config: &Config) -> Vec<String> {
        discover_files(root, config)
            .unwrap()
            .iter()
            .map(|p| relative_path(root, p))
            .collect()
    }

    #[test]
    fn test_discovery_filters() {
        let dir = TempDir::new().unwrap();
        for rel in [
            "src/app.ts",
            "src/routes/users.js",
            "src/routes/users.test.js",
            "src/types.d.ts",
            "src/README.md",
            "prisma/schema.prisma",
            "node_modules/express/index.js",
            "dist/app.js",
            "coverage/lcov.js",
            "src/__tests__/app.ts",
            ".next/server/page.js",
        ] {
            touch(dir.path(), rel);
        }

        assert_eq!(
            discovered(dir.path(), &Config::default()),
            vec!["prisma/schema.prisma", "src/app.ts", "src/routes/users.js"]
        );
    }

    #[test]
    fn test_discovery_honors_configured_globs() {
        let dir = TempDir::new().unwrap();
        for rel in ["src/app.ts", "src/legacy/old.js", "scripts/seed.js"] {
            touch(dir.path(), rel);
        }
        let config = Config {
            include: vec!["src/**/*.{ts,js}".to_string()],
            exclude: vec!["**/legacy/**".to_string()],
            ..Config::default()
        };
        assert_eq!(discovered(dir.path(), &config), vec!["src/app.ts"]);
    }
}
