#![allow(dead_code)]

pub mod app_tree {
    use std::path::{Path, PathBuf};

    use t2engine::controller::{ControllerClass, ControllerRegistry};
    use t2engine::inject::ParamSpec;

    /// Blog post controller used by convention tests.
    pub struct PostController;

    pub fn post_controller() -> ControllerClass {
        ControllerClass::new("app\\blog\\controller\\post", || PostController)
            .action("index", vec![], |_: &PostController, _req, _args| Ok("post index"))
            .action("show", vec![ParamSpec::int("id").with_default(0.into())], |_: &PostController, _req, args| {
                Ok(format!("post {}", args.int("id").unwrap_or(0)))
            })
            .private_method("render_partial")
    }

    /// Create `<root>/<relative>` with empty content, making parents.
    pub fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "").unwrap();
        path
    }

    /// Application tree on disk with the blog post controller registered for
    /// autoload from its defining file.
    pub fn blog_tree() -> (tempfile::TempDir, std::sync::Arc<ControllerRegistry>) {
        let tmp = tempfile::tempdir().unwrap();
        let file = touch(tmp.path(), "blog/controller/post.rs");
        let registry = std::sync::Arc::new(ControllerRegistry::new());
        registry.autoload(&file, post_controller());
        (tmp, registry)
    }
}

pub mod requests {
    use http::Method;
    use t2engine::Request;

    pub fn get(target: &str) -> Request {
        Request::new(Method::GET, target)
    }

    pub fn json_get(target: &str) -> Request {
        Request::new(Method::GET, target).with_header("accept", "application/json")
    }
}

pub mod test_runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}
