// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage implementations for the build pipeline.
//!
//! These are the stages the executor performs itself; compile and sign go
//! through the [`Toolchain`](crate::Toolchain) seam. Every function is a
//! plain fallible step over the workspace, classification into the failure
//! taxonomy happens here via [`StageFailure`].

use crate::workspace::Workspace;
use forge_core::{
    AppConfig, ArtifactKind, ArtifactMeta, BuildRequest, Clock, FailureCause, IdGen, JobId,
};
use forge_storage::{ArtifactError, ArtifactStore};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Classified failure of one stage.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub cause: FailureCause,
    pub message: String,
}

impl StageFailure {
    pub fn tool(message: impl Into<String>) -> Self {
        Self {
            cause: FailureCause::Tool,
            message: message.into(),
        }
    }

    pub fn infra(message: impl Into<String>) -> Self {
        Self {
            cause: FailureCause::Infra,
            message: message.into(),
        }
    }
}

impl From<io::Error> for StageFailure {
    fn from(e: io::Error) -> Self {
        Self::infra(format!("workspace io: {e}"))
    }
}

impl From<serde_json::Error> for StageFailure {
    fn from(e: serde_json::Error) -> Self {
        Self::infra(format!("serialization: {e}"))
    }
}

impl From<ArtifactError> for StageFailure {
    fn from(e: ArtifactError) -> Self {
        Self::infra(format!("artifact store: {e}"))
    }
}

impl From<crate::ToolError> for StageFailure {
    fn from(e: crate::ToolError) -> Self {
        Self {
            cause: e.cause(),
            message: e.to_string(),
        }
    }
}

/// A packaged file awaiting verification and registration.
#[derive(Debug, Clone)]
pub struct PackagedFile {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

const APP_SOURCE_TEMPLATE: &str = r#"package {{package_name}}

object AppInfo {
    const val NAME = "{{app_name}}"
    const val VERSION = "{{version}}"
    const val VERSION_CODE = {{version_code}}
    const val API_BASE_URL = "{{api_base_url}}"
}
"#;

const MANIFEST_TEMPLATE: &str = r#"<manifest package="{{package_name}}"
    versionName="{{version}}"
    versionCode="{{version_code}}">
    <application label="{{app_name}}" />
</manifest>
"#;

const THEME_TEMPLATE: &str = r#"<resources>
    <style name="AppTheme">
        <item name="colorPrimary">{{primary_color}}</item>
        <item name="colorSecondary">{{secondary_color}}</item>
        <item name="colorAccent">{{accent_color}}</item>
        <item name="fontFamily">{{font_family}}</item>
    </style>
</resources>
"#;

/// Init: snapshot the request and lay down the template sources.
pub fn init_workspace(ws: &Workspace, request: &BuildRequest) -> Result<(), StageFailure> {
    let config_json = serde_json::to_vec_pretty(&request.app)?;
    fs::write(ws.root().join("app-config.json"), config_json)?;

    let src = ws.src_dir();
    fs::write(src.join("AppInfo.kt.tmpl"), APP_SOURCE_TEMPLATE)?;
    fs::write(src.join("AndroidManifest.xml.tmpl"), MANIFEST_TEMPLATE)?;
    fs::write(src.join("theme.xml.tmpl"), THEME_TEMPLATE)?;
    Ok(())
}

fn substitutions(app: &AppConfig) -> BTreeMap<&'static str, String> {
    let branding = &app.branding;
    let mut map = BTreeMap::new();
    map.insert("app_name", app.app_name.clone());
    map.insert("package_name", app.package_name.clone());
    map.insert("version", app.version.clone());
    map.insert("version_code", app.version_code.to_string());
    map.insert("api_base_url", app.api_base_url.clone());
    map.insert("primary_color", branding.primary_color.clone());
    map.insert("secondary_color", branding.secondary_color.clone());
    map.insert(
        "accent_color",
        branding
            .accent_color
            .clone()
            .unwrap_or_else(|| branding.secondary_color.clone()),
    );
    map.insert(
        "font_family",
        branding
            .font_family
            .clone()
            .unwrap_or_else(|| "sans-serif".to_string()),
    );
    map
}

/// Branding: substitute partner values into every `.tmpl` source.
pub fn apply_branding(ws: &Workspace, app: &AppConfig) -> Result<(), StageFailure> {
    let map = substitutions(app);

    for entry in fs::read_dir(ws.src_dir())? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("tmpl") {
            continue;
        }

        let mut content = fs::read_to_string(&path)?;
        for (token, value) in &map {
            content = content.replace(&format!("{{{{{token}}}}}"), value);
        }
        if let Some(start) = content.find("{{") {
            let tail: String = content[start..].chars().take(32).collect();
            return Err(StageFailure::tool(format!(
                "unresolved template token near {tail:?} in {}",
                path.display()
            )));
        }

        fs::write(path.with_extension(""), content)?;
        fs::remove_file(&path)?;
    }
    Ok(())
}

/// Resources: emit the generated resource set from the config snapshot.
pub fn generate_resources(ws: &Workspace, app: &AppConfig) -> Result<(), StageFailure> {
    let res = ws.res_dir();
    let branding = &app.branding;

    let colors = format!(
        "<resources>\n    <color name=\"primary\">{}</color>\n    <color name=\"secondary\">{}</color>\n</resources>\n",
        branding.primary_color, branding.secondary_color
    );
    fs::write(res.join("colors.xml"), colors)?;

    let strings = format!(
        "<resources>\n    <string name=\"app_name\">{}</string>\n</resources>\n",
        app.app_name
    );
    fs::write(res.join("strings.xml"), strings)?;

    let features = serde_json::to_vec_pretty(&app.features)?;
    fs::write(res.join("features.json"), features)?;
    Ok(())
}

/// Package: collect toolchain outputs under `out/` with distribution names,
/// plus a machine-readable build report.
pub fn package(
    ws: &Workspace,
    request: &BuildRequest,
    binary: &Path,
    mapping: Option<&Path>,
    bundle: Option<&Path>,
) -> Result<Vec<PackagedFile>, StageFailure> {
    let app = &request.app;
    let out = ws.out_dir();
    let mut files = Vec::new();

    let apk_name = format!("{}-{}.apk", app.package_name, app.version);
    let apk_path = out.join(&apk_name);
    fs::copy(binary, &apk_path)?;
    files.push(PackagedFile {
        name: apk_name,
        kind: ArtifactKind::Binary,
        path: apk_path,
    });

    if let Some(mapping) = mapping {
        let path = out.join("mapping.txt");
        fs::copy(mapping, &path)?;
        files.push(PackagedFile {
            name: "mapping.txt".to_string(),
            kind: ArtifactKind::Mapping,
            path,
        });
    }

    if let Some(bundle) = bundle {
        let aab_name = format!("{}-{}.aab", app.package_name, app.version);
        let path = out.join(&aab_name);
        fs::copy(bundle, &path)?;
        files.push(PackagedFile {
            name: aab_name,
            kind: ArtifactKind::Bundle,
            path,
        });
    }

    let report = serde_json::json!({
        "app_name": app.app_name,
        "package_name": app.package_name,
        "version": app.version,
        "version_code": app.version_code,
        "output": request.output,
        "files": files.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
    });
    let report_path = out.join("build-report.json");
    fs::write(&report_path, serde_json::to_vec_pretty(&report)?)?;
    files.push(PackagedFile {
        name: "build-report.json".to_string(),
        kind: ArtifactKind::Report,
        path: report_path,
    });

    Ok(files)
}

/// Verify: re-read every packaged file and register it with the artifact
/// store, which checksums on the way in.
pub fn verify<C: Clock, G: IdGen>(
    store: &ArtifactStore<C, G>,
    job_id: &JobId,
    packaged: &[PackagedFile],
) -> Result<Vec<ArtifactMeta>, StageFailure> {
    let mut metas = Vec::with_capacity(packaged.len());
    for file in packaged {
        let bytes = fs::read(&file.path)?;
        if bytes.is_empty() {
            return Err(StageFailure::tool(format!(
                "packaged artifact {} is empty",
                file.name
            )));
        }
        let stored = store.put(job_id, &file.name, file.kind, &bytes)?;
        metas.push(ArtifactMeta {
            name: file.name.clone(),
            kind: file.kind,
            size: stored.size,
            checksum: stored.checksum,
            reference: stored.reference,
        });
    }
    Ok(metas)
}

#[cfg(test)]
#[path = "stages_tests.rs"]
mod tests;
