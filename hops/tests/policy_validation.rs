//! End-to-end policy validation scenarios: parse a TOML document and
//! validate it in one call, exercising filesystem-dependent checks
//! (`validate`'s mount/symlink/rootfs handling) that the parser's own
//! unit tests don't reach.

use std::os::unix::fs::symlink;

#[test]
fn full_policy_with_real_bind_mount_is_accepted() {
    let source_dir = tempfile::tempdir().unwrap();
    let dest = source_dir.path().join("dest-placeholder");
    let text = format!(
        r#"
        name = "builder"
        version = "1.0.0"

        [capability_grant]
        network_mode = "Outbound"

        [sandbox_config]
        root_path = "/"

        [[sandbox_config.mounts]]
        source = "{source}"
        destination = "{dest}"
        type = "Bind"
        mode = "ReadOnly"
        "#,
        source = source_dir.path().display(),
        dest = dest.display(),
    );

    let policy = hops::policy::load(&text).unwrap();
    assert!(policy.is_networked());
    assert_eq!(policy.sandbox_config.mounts.len(), 1);
}

#[test]
fn bind_mount_with_missing_source_is_rejected() {
    let text = r#"
        name = "builder"
        [sandbox_config]
        root_path = "/"
        [[sandbox_config.mounts]]
        source = "/no/such/path/hops-test"
        destination = "/data"
        type = "Bind"
        mode = "ReadOnly"
    "#;

    let err = hops::policy::load(text).unwrap_err();
    assert!(matches!(err, hops_shared::errors::HopsError::Configuration(m) if m.contains("InsecureMountConfiguration")));
}

#[test]
fn read_write_mount_overlapping_a_sensitive_path_is_rejected() {
    let source_dir = tempfile::tempdir().unwrap();
    let text = format!(
        r#"
        name = "builder"
        [sandbox_config]
        root_path = "/"
        [[sandbox_config.mounts]]
        source = "{source}"
        destination = "/etc/ssh"
        type = "Bind"
        mode = "ReadWrite"
        "#,
        source = source_dir.path().display(),
    );

    let err = hops::policy::load(&text).unwrap_err();
    assert!(matches!(err, hops_shared::errors::HopsError::Isolation(m) if m.contains("InsecureMountConfiguration")));
}

#[test]
fn read_write_mount_bypassing_via_dot_dot_traversal_is_rejected() {
    let source_dir = tempfile::tempdir().unwrap();
    let text = format!(
        r#"
        name = "builder"
        [sandbox_config]
        root_path = "/"
        [[sandbox_config.mounts]]
        source = "{source}"
        destination = "/tmp/x/../../etc/ssh"
        type = "Bind"
        mode = "ReadWrite"
        "#,
        source = source_dir.path().display(),
    );

    let err = hops::policy::load(&text).unwrap_err();
    assert!(matches!(err, hops_shared::errors::HopsError::Isolation(m) if m.contains("InsecureMountConfiguration")));
}

#[test]
fn symlink_bind_source_resolving_into_a_sensitive_path_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let link = dir.path().join("sneaky");
    symlink("/etc/shadow", &link).unwrap();

    let text = format!(
        r#"
        name = "builder"
        [sandbox_config]
        root_path = "/"
        [[sandbox_config.mounts]]
        source = "{link}"
        destination = "/data"
        type = "Bind"
        mode = "ReadOnly"
        "#,
        link = link.display(),
    );

    let err = hops::policy::load(&text).unwrap_err();
    assert!(matches!(err, hops_shared::errors::HopsError::Isolation(_)));
}

#[test]
fn overlapping_mount_destinations_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let text = format!(
        r#"
        name = "builder"
        [sandbox_config]
        root_path = "/"
        [[sandbox_config.mounts]]
        source = "{dir}"
        destination = "/data"
        type = "Bind"
        mode = "ReadOnly"
        [[sandbox_config.mounts]]
        source = "{dir}"
        destination = "/data/nested"
        type = "Bind"
        mode = "ReadOnly"
        "#,
        dir = dir.path().display(),
    );

    let err = hops::policy::load(&text).unwrap_err();
    assert!(matches!(err, hops_shared::errors::HopsError::Configuration(m) if m.contains("ConflictingPaths")));
}

#[test]
fn rootfs_image_must_exist_on_disk() {
    let text = r#"
        name = "builder"
        rootfs_image = "/no/such/rootfs.ext4"
        [sandbox_config]
        root_path = "/"
    "#;

    let err = hops::policy::load(text).unwrap_err();
    assert!(matches!(err, hops_shared::errors::HopsError::Configuration(m) if m.contains("RootfsNotFound")));
}

#[test]
fn named_rootfs_image_resolves_under_the_default_state_dir() {
    let home = std::env::var_os("HOME");
    let text = r#"
        name = "builder"
        rootfs_image = "does-not-exist-anywhere"
        [sandbox_config]
        root_path = "/"
    "#;

    let err = hops::policy::load(text).unwrap_err();
    // Either a resolvable-but-missing state dir or "no state directory"
    // (if $HOME is unset in the test environment) is acceptable; what
    // matters is that the named reference was actually looked up rather
    // than silently ignored.
    match home {
        Some(_) => assert!(matches!(err, hops_shared::errors::HopsError::Configuration(m) if m.contains("RootfsNotFound"))),
        None => assert!(matches!(err, hops_shared::errors::HopsError::Configuration(_))),
    }
}
