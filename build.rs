use git2::Repository;
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

// Records the commit the binary was built from so `gutterline --version` can report it.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("build_commit.rs");
    let mut f = File::create(&dest_path).unwrap();

    let commit = Repository::discover(".")
        .ok()
        .and_then(|repo| {
            repo.head()
                .ok()
                .and_then(|head| head.peel_to_commit().ok())
                .map(|commit| commit.id().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    writeln!(&mut f, "pub const BUILD_COMMIT: &str = \"{commit}\";").unwrap();
}
