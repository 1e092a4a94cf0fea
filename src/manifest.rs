//! `package.json` lookup.
//!
//! Only the declared dependency names are read. A missing or malformed
//! manifest yields an empty result and a warning.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use phf::phf_map;
use serde::Deserialize;
use tracing::{debug, warn};

/// Frameworks and ORMs the extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Framework {
    Express,
    Fastify,
    Koa,
    Hapi,
    NestJs,
    NextJs,
    Mongoose,
    Sequelize,
    TypeOrm,
    Prisma,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Express => "express",
            Framework::Fastify => "fastify",
            Framework::Koa => "koa",
            Framework::Hapi => "hapi",
            Framework::NestJs => "nestjs",
            Framework::NextJs => "nextjs",
            Framework::Mongoose => "mongoose",
            Framework::Sequelize => "sequelize",
            Framework::TypeOrm => "typeorm",
            Framework::Prisma => "prisma",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// npm package name → framework.
static PACKAGES: phf::Map<&'static str, Framework> = phf_map! {
    "express" => Framework::Express,
    "fastify" => Framework::Fastify,
    "koa" => Framework::Koa,
    "@koa/router" => Framework::Koa,
    "koa-router" => Framework::Koa,
    "@hapi/hapi" => Framework::Hapi,
    "hapi" => Framework::Hapi,
    "@nestjs/core" => Framework::NestJs,
    "@nestjs/common" => Framework::NestJs,
    "next" => Framework::NextJs,
    "mongoose" => Framework::Mongoose,
    "@nestjs/mongoose" => Framework::Mongoose,
    "sequelize" => Framework::Sequelize,
    "sequelize-typescript" => Framework::Sequelize,
    "typeorm" => Framework::TypeOrm,
    "@nestjs/typeorm" => Framework::TypeOrm,
    "prisma" => Framework::Prisma,
    "@prisma/client" => Framework::Prisma,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, serde_json::Value>,
}

/// What the root manifest declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestInfo {
    pub name: Option<String>,
    pub frameworks: BTreeSet<Framework>,
}

fn parse_manifest(content: &str) -> Result<ManifestInfo, serde_json::Error> {
    let pkg: PackageJson = serde_json::from_str(content)?;
    let frameworks = pkg
        .dependencies
        .keys()
        .chain(pkg.dev_dependencies.keys())
        .chain(pkg.peer_dependencies.keys())
        .filter_map(|dep| PACKAGES.get(dep.as_str()).copied())
        .collect();
    Ok(ManifestInfo {
        name: pkg.name,
        frameworks,
    })
}

/// Frameworks declared by `root/package.json`.
pub fn detect_frameworks(root: &Path) -> ManifestInfo {
    let path = root.join("package.json");
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            debug!(manifest = %path.display(), error = %e, "no package manifest");
            return ManifestInfo::default();
        }
    };
    match parse_manifest(&content) {
        Ok(info) => info,
        Err(e) => {
            warn!(manifest = %path.display(), error = %e, "ignoring malformed package manifest");
            ManifestInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_manifest() {
        let json = r#"{
  "name": "shop-api",
  "dependencies": { "express": "^4.18.0", "mongoose": "^7.0.0", "lodash": "*" },
  "devDependencies": { "prisma": "^5.0.0" }
}"#;
        let info = parse_manifest(json).unwrap();
        assert_eq!(info.name.as_deref(), Some("shop-api"));
        assert_eq!(
            info.frameworks.into_iter().collect::<Vec<_>>(),
            vec![Framework::Express, Framework::Mongoose, Framework::Prisma]
        );
    }

    #[test]
    fn test_missing_or_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_frameworks(dir.path()), ManifestInfo::default());

        fs::write(dir.path().join("package.json"), "{ not json").unwrap();
        assert_eq!(detect_frameworks(dir.path()), ManifestInfo::default());
    }
}
