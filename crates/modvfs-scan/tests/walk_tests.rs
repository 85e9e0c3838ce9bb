use std::fs;
use std::sync::Arc;
use std::time::SystemTime;

use modvfs_core::WarningKind;
use modvfs_scan::{
    DirectoryWalker, FnVisitor, IngestConfig, JwalkWalker, WalkOptions, WalkSummary, WalkVisitor,
    WalkdirWalker, WalkerKind, take_snapshot, walker_for,
};
use tempfile::TempDir;

fn create_mod_folder() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("Meshes/Armor")).unwrap();
    fs::create_dir_all(root.join("Textures")).unwrap();
    fs::create_dir_all(root.join("Empty")).unwrap();
    fs::write(root.join("Meshes/Armor/Iron.nif"), "iron").unwrap();
    fs::write(root.join("Meshes/x.nif"), "x").unwrap();
    fs::write(root.join("Textures/sky.dds"), "sky sky").unwrap();
    fs::write(root.join("plugin.esp"), "plugin").unwrap();
    temp
}

/// Checks that every start has a matching end in LIFO order.
#[derive(Default)]
struct BalanceChecker {
    open: Vec<String>,
    max_depth: usize,
    files: Vec<(usize, String)>,
    balanced: bool,
}

impl WalkVisitor for BalanceChecker {
    fn on_directory_start(&mut self, name: &str) {
        self.open.push(name.to_string());
        self.max_depth = self.max_depth.max(self.open.len());
    }

    fn on_directory_end(&mut self, name: &str) {
        self.balanced = self.open.pop().as_deref() == Some(name);
        assert!(self.balanced, "unbalanced end for {name}");
    }

    fn on_file(&mut self, name: &str, _modified: SystemTime, _size: u64) {
        self.files.push((self.open.len(), name.to_string()));
    }
}

fn check_walker(walker: &dyn DirectoryWalker) {
    let temp = create_mod_folder();
    let mut checker = BalanceChecker::default();
    let summary = walker.walk(temp.path(), &mut checker).unwrap();

    assert!(checker.open.is_empty());
    assert_eq!(checker.max_depth, 2);
    assert_eq!(summary.files, 4);
    assert_eq!(summary.directories, 4);
    assert_eq!(summary.bytes, 4 + 1 + 7 + 6);

    let mut files = checker.files.clone();
    files.sort();
    assert_eq!(
        files,
        vec![
            (0, "plugin.esp".to_string()),
            (1, "sky.dds".to_string()),
            (1, "x.nif".to_string()),
            (2, "Iron.nif".to_string()),
        ]
    );
}

#[test]
fn test_batched_walker_contract() {
    check_walker(&JwalkWalker::default());
}

#[test]
fn test_sequential_walker_contract() {
    check_walker(&WalkdirWalker::default());
}

#[test]
fn test_walker_for_selects_kind() {
    let temp = create_mod_folder();
    for kind in [WalkerKind::Batched, WalkerKind::Sequential] {
        let config = IngestConfig::builder().walker(kind).build().unwrap();
        let walker: Arc<dyn DirectoryWalker> = walker_for(&config);
        let (snapshot, _) = take_snapshot(walker.as_ref(), temp.path()).unwrap();
        assert_eq!(snapshot.file_count(), 4);
        assert!(snapshot.dirs.iter().any(|d| d.name == "Empty" && d.is_empty()));
    }
}

#[test]
fn test_closure_visitor() {
    let temp = create_mod_folder();
    let mut names = Vec::new();
    let mut visitor = FnVisitor::new(|_| {}, |_| {}, |name: &str, _, size| {
        names.push((name.to_string(), size));
    });
    WalkdirWalker::default().walk(temp.path(), &mut visitor).unwrap();
    drop(visitor);

    names.sort();
    assert_eq!(names[0], ("Iron.nif".to_string(), 4));
    assert_eq!(names.len(), 4);
}

fn following_links() -> WalkOptions {
    WalkOptions {
        follow_symlinks: true,
        ..WalkOptions::default()
    }
}

#[cfg(unix)]
fn walk_past_dangling_link(walker: &dyn DirectoryWalker) -> (BalanceChecker, WalkSummary) {
    let temp = create_mod_folder();
    std::os::unix::fs::symlink(
        temp.path().join("Meshes/gone"),
        temp.path().join("Meshes/broken.nif"),
    )
    .unwrap();

    let mut checker = BalanceChecker::default();
    let summary = walker.walk(temp.path(), &mut checker).unwrap();
    (checker, summary)
}

#[cfg(unix)]
#[test]
fn test_failed_entry_keeps_siblings_and_balance() {
    let walkers: [Box<dyn DirectoryWalker>; 2] = [
        Box::new(JwalkWalker::new(following_links())),
        Box::new(WalkdirWalker::new(following_links())),
    ];

    let mut kinds = Vec::new();
    for walker in &walkers {
        let (checker, summary) = walk_past_dangling_link(walker.as_ref());

        assert!(checker.open.is_empty());
        assert_eq!(summary.files, 4);
        assert_eq!(summary.directories, 4);
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].path.ends_with("broken.nif"));

        let mut files: Vec<_> = checker.files.iter().map(|(_, name)| name.as_str()).collect();
        files.sort();
        assert_eq!(files, vec!["Iron.nif", "plugin.esp", "sky.dds", "x.nif"]);
        kinds.push(summary.warnings[0].kind);
    }
    assert_eq!(kinds, vec![WarningKind::ReadError, WarningKind::ReadError]);
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let walkers: [Box<dyn DirectoryWalker>; 2] = [
        Box::new(JwalkWalker::default()),
        Box::new(WalkdirWalker::default()),
    ];

    for walker in &walkers {
        let temp = create_mod_folder();
        let locked = temp.path().join("Locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("secret.txt"), "s").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Running as root ignores permissions; nothing to check then.
        let readable = fs::read_dir(&locked).is_ok();

        let mut checker = BalanceChecker::default();
        let summary = walker.walk(temp.path(), &mut checker).unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(checker.open.is_empty());
        if !readable {
            assert_eq!(summary.warnings.len(), 1);
            assert_eq!(summary.warnings[0].kind, WarningKind::PermissionDenied);
            assert_eq!(summary.files, 4);
            assert_eq!(summary.directories, 5);
            assert!(checker.files.iter().all(|(_, name)| name != "secret.txt"));
        }
    }
}
