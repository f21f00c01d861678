//! The fixed pipeline: atomic tasks, the `default` and `build` compositions,
//! and the watch bindings.

use std::sync::Arc;

use sitepipe_server::{
    PreviewConfig, PreviewServer, ReloadHub, WatchBinding, WatchError, WatchSession,
};
use sitepipe_static::{clean, copy, html, styles, templates, vendor, AssetError, Paths};
use sitepipe_tasks::{ActionResult, Task, TaskError, TaskRegistry};

pub const CLEAR_LOCK_FILE: &str = "clear-lock-file";
pub const CLEAR_OUTPUT_DIR: &str = "clear-output-dir";
pub const COPY_MISC_FILES: &str = "copy-misc-files";
pub const COPY_VENDOR_LIBS: &str = "copy-vendor-libs";
pub const EXPAND_TEMPLATES: &str = "expand-templates";
pub const COPY_FONTS: &str = "copy-fonts";
pub const COMPILE_STYLES: &str = "compile-styles";
pub const COPY_SCRIPTS: &str = "copy-scripts";
pub const ASSEMBLE_HTML: &str = "assemble-html";
pub const COPY_IMAGES: &str = "copy-images";
pub const START_PREVIEW_SERVER: &str = "start-preview-server";
pub const START_WATCHER: &str = "start-watcher";
pub const RELOAD: &str = "reload";

/// Production pipeline: build, then serve and watch.
pub const DEFAULT: &str = "default";

/// Build-only pipeline.
pub const BUILD: &str = "build";

/// Build steps, in declaration order.
pub const BUILD_STEPS: [&str; 10] = [
    CLEAR_LOCK_FILE,
    CLEAR_OUTPUT_DIR,
    COPY_MISC_FILES,
    COPY_VENDOR_LIBS,
    EXPAND_TEMPLATES,
    COPY_FONTS,
    COMPILE_STYLES,
    COPY_SCRIPTS,
    ASSEMBLE_HTML,
    COPY_IMAGES,
];

/// Long-lived services the pipeline drives.
pub struct Services {
    pub hub: ReloadHub,
    pub server: Arc<PreviewServer>,
    pub watcher: Arc<WatchSession>,
}

impl Services {
    /// Create the preview server and watch session for a project.
    ///
    /// `preview.roots` is replaced by the project's fallback roots.
    pub fn new(paths: &Paths, preview: PreviewConfig) -> Result<Self, WatchError> {
        let hub = ReloadHub::new();
        let server = PreviewServer::new(
            PreviewConfig {
                roots: paths.preview_roots(),
                ..preview
            },
            hub.clone(),
        );
        let watcher = WatchSession::new(
            &paths.root,
            vec![paths.src.base.dir.clone()],
            watch_bindings(paths)?,
        );

        Ok(Self {
            hub,
            server: Arc::new(server),
            watcher: Arc::new(watcher),
        })
    }

    /// Whether anything is left running after a task completes.
    pub fn is_running(&self) -> bool {
        self.server.addr().is_some() || self.watcher.is_started()
    }
}

/// Source changes and the compositions they trigger.
pub fn watch_bindings(paths: &Paths) -> Result<Vec<WatchBinding>, WatchError> {
    let src = &paths.src;

    Ok(vec![
        WatchBinding::new(
            "images",
            [src.images.files()],
            Task::series([COPY_IMAGES, RELOAD]),
        )?,
        WatchBinding::new(
            "scripts",
            [src.js.files()],
            Task::series([COPY_SCRIPTS, RELOAD]),
        )?,
        WatchBinding::new(
            "styles",
            [src.scss.files()],
            Task::series([COMPILE_STYLES, RELOAD]),
        )?,
        WatchBinding::new(
            "templates",
            [src.html.files(), src.partials.files()],
            Task::series([EXPAND_TEMPLATES, COMPILE_STYLES, RELOAD]),
        )?,
    ])
}

/// Run a cleanup step inline.
///
/// Inside a parallel group it completes on the first poll, before any
/// sibling starts writing.
fn cleanup(paths: &Arc<Paths>, step: fn(&Paths) -> Result<bool, AssetError>) -> Task {
    let paths = Arc::clone(paths);
    Task::action(move || {
        let paths = Arc::clone(&paths);
        async move {
            step(&paths)?;
            ActionResult::Ok(())
        }
    })
}

/// Run a file transform on the blocking pool.
fn transform(
    paths: &Arc<Paths>,
    name: &'static str,
    step: fn(&Paths) -> Result<usize, AssetError>,
) -> Task {
    let paths = Arc::clone(paths);
    Task::action(move || {
        let paths = Arc::clone(&paths);
        async move {
            let count = tokio::task::spawn_blocking(move || step(&paths)).await??;
            tracing::debug!("'{}' wrote {} file(s)", name, count);
            ActionResult::Ok(())
        }
    })
}

/// Register every task and composition, and attach the watch session.
pub fn build_registry(paths: &Paths, services: &Services) -> Result<Arc<TaskRegistry>, TaskError> {
    let paths = Arc::new(paths.clone());
    let mut registry = TaskRegistry::new();

    registry.register(CLEAR_LOCK_FILE, cleanup(&paths, clean::remove_lock_file))?;
    registry.register(CLEAR_OUTPUT_DIR, cleanup(&paths, clean::remove_output_dir))?;

    let transforms: [(&'static str, fn(&Paths) -> Result<usize, AssetError>); 8] = [
        (COPY_MISC_FILES, copy::copy_misc),
        (COPY_VENDOR_LIBS, vendor::copy_vendor_libs),
        (EXPAND_TEMPLATES, templates::expand_templates),
        (COPY_FONTS, copy::copy_fonts),
        (COMPILE_STYLES, styles::compile_styles),
        (COPY_SCRIPTS, copy::copy_scripts),
        (ASSEMBLE_HTML, html::assemble_html),
        (COPY_IMAGES, copy::copy_images),
    ];
    for (name, step) in transforms {
        registry.register(name, transform(&paths, name, step))?;
    }

    let server = Arc::clone(&services.server);
    registry.register(
        START_PREVIEW_SERVER,
        Task::action(move || {
            let server = Arc::clone(&server);
            async move {
                server.start().await?;
                ActionResult::Ok(())
            }
        }),
    )?;

    let watcher = Arc::clone(&services.watcher);
    registry.register(
        START_WATCHER,
        Task::action(move || {
            let watcher = Arc::clone(&watcher);
            async move {
                watcher.start().await?;
                ActionResult::Ok(())
            }
        }),
    )?;

    let hub = services.hub.clone();
    registry.register(
        RELOAD,
        Task::action(move || {
            hub.reload();
            async { ActionResult::Ok(()) }
        }),
    )?;

    registry.register(
        DEFAULT,
        Task::series([
            Task::parallel(BUILD_STEPS),
            Task::parallel([START_PREVIEW_SERVER, START_WATCHER]),
        ]),
    )?;
    registry.register(BUILD, Task::series(BUILD_STEPS))?;

    registry.validate()?;

    for binding in services.watcher.bindings() {
        for missing in binding.task.references() {
            if !registry.contains(missing) {
                return Err(TaskError::UnknownReference {
                    task: binding.name.clone(),
                    missing: missing.to_string(),
                });
            }
        }
    }

    let registry = Arc::new(registry);
    services.watcher.attach(&registry);

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::net::SocketAddr;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn preview() -> PreviewConfig {
        PreviewConfig {
            port: 0,
            open: false,
            ..PreviewConfig::default()
        }
    }

    fn project() -> (tempfile::TempDir, Paths) {
        let temp = tempdir().unwrap();
        let paths = Paths::new(temp.path());
        let src = &paths.src.base.dir;

        write(&src.join("partials/header.html"), "<header>Site</header>\n");
        write(
            &src.join("index.html"),
            r#"<body>
{% include "partials/header.html" %}<main>Home</main>
<!-- build:js assets/js/vendor.min.js -->
<script src="node_modules/lib/lib.js"></script>
<script src="assets/js/app.js"></script>
<!-- endbuild -->
</body>
"#,
        );
        write(&src.join("assets/scss/_vars.scss"), "$brand: #336699;\n");
        write(
            &src.join("assets/scss/app.scss"),
            "@import \"vars\";\n.title { color: $brand; }\n",
        );
        write(&src.join("assets/js/app.js"), "console.log('hi');\n");
        write(&src.join("robots.txt"), "User-agent: *\n");

        write(
            &paths.base.package_json,
            r#"{ "dependencies": { "lib": "^1.0.0" } }"#,
        );
        write(
            &paths.base.node_modules.join("lib/dist/lib.js"),
            "window.libLoaded = true;\n",
        );

        write(&paths.dist.base.dir.join("stale.html"), "old");
        write(&paths.base.package_lock, "{}");

        (temp, paths)
    }

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            for entry in fs::read_dir(&current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.insert(path.clone(), fs::read(&path).unwrap());
                }
            }
        }
        files
    }

    fn assert_assembled(paths: &Paths) {
        let index = fs::read_to_string(paths.dist.base.dir.join("index.html")).unwrap();
        assert!(index.contains("<header>Site</header>"), "{}", index);
        assert!(
            index.contains(r#"<script src="assets/js/vendor.min.js"></script>"#),
            "{}",
            index
        );
        assert!(!index.contains("build:js"), "{}", index);
        assert!(!index.contains("node_modules"), "{}", index);

        let bundle = fs::read_to_string(paths.dist.js.join("vendor.min.js")).unwrap();
        assert!(bundle.contains("libLoaded"), "{}", bundle);
        assert!(bundle.contains("console.log"), "{}", bundle);
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn default_builds_then_serves_and_watches() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        assert_eq!(
            registry.get(DEFAULT).unwrap().to_string(),
            "series(parallel(clear-lock-file, clear-output-dir, copy-misc-files, \
             copy-vendor-libs, expand-templates, copy-fonts, compile-styles, copy-scripts, \
             assemble-html, copy-images), parallel(start-preview-server, start-watcher))"
        );
        assert_eq!(
            registry.get(BUILD).unwrap().references(),
            BUILD_STEPS.to_vec()
        );
    }

    #[test]
    fn registers_every_task() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        for name in BUILD_STEPS
            .into_iter()
            .chain([START_PREVIEW_SERVER, START_WATCHER, RELOAD, DEFAULT, BUILD])
        {
            assert!(registry.contains(name), "missing task {}", name);
        }
        assert_eq!(registry.names().len(), 15);
    }

    #[tokio::test]
    async fn build_produces_the_site() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        registry.run(BUILD).await.unwrap();

        let dist = &paths.dist.base.dir;
        assert!(!dist.join("stale.html").exists());
        assert!(!paths.base.package_lock.exists());

        let index = fs::read_to_string(dist.join("index.html")).unwrap();
        assert!(index.contains("<header>Site</header>"));
        assert!(!index.contains("{% include"));
        assert_assembled(&paths);
        assert!(paths.dist.libs.join("lib/lib.js").exists());

        assert!(paths.dist.css.join("app.css").exists());
        assert!(paths.dist.css.join("app.min.css").exists());
        assert!(paths.dist.css.join("app.min.css.map").exists());
        assert!(!paths.dist.css.join("_vars.css").exists());
        assert!(paths.dist.js.join("app.js").exists());
        assert!(dist.join("robots.txt").exists());

        assert!(!services.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_build_always_ends_assembled() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();
        let steps = Task::parallel(BUILD_STEPS);

        for _ in 0..20 {
            registry.run_task(DEFAULT, &steps).await.unwrap();
            assert_assembled(&paths);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn default_builds_serves_and_watches() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        registry.run(DEFAULT).await.unwrap();

        assert_assembled(&paths);
        assert!(!paths.dist.base.dir.join("stale.html").exists());
        assert!(services.is_running());
        assert!(services.watcher.is_started());

        let addr = services.server.addr().unwrap();
        let response = get(addr, "/assets/scss/app.scss").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains("$brand"));

        let response = get(addr, "/").await;
        assert!(response.contains("vendor.min.js"));
        assert!(response.contains("/__reload.js"));
    }

    #[tokio::test]
    async fn rebuilding_unchanged_input_is_byte_identical() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        registry.run(BUILD).await.unwrap();
        let first = snapshot(&paths.dist.base.dir);
        registry.run(BUILD).await.unwrap();
        let second = snapshot(&paths.dist.base.dir);

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failures_name_the_task() {
        let (_temp, paths) = project();
        write(
            &paths.src.scss.dir.join("broken.scss"),
            ".title { color: $undefined; }\n",
        );
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        let err = registry.run(BUILD).await.unwrap_err();

        assert_eq!(err.task(), Some(COMPILE_STYLES));
        // Steps after the failure never ran
        assert!(!paths.dist.js.join("app.js").exists());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (_temp, paths) = project();
        let services = Services::new(&paths, preview()).unwrap();
        let registry = build_registry(&paths, &services).unwrap();

        assert_eq!(
            registry.run("deploy").await,
            Err(TaskError::NotFound("deploy".to_string()))
        );
    }
}
