// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use common::{FakeSftp, FakeTransport, MissingSignal, PutEvent};
use ssh_session::error::Error;
use ssh_session::ssh::SftpChannel;
use ssh_session::transfer::{
    get_directory, put_directory, GetDirectoryOptions, PutDirectoryOptions,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Ticks = Arc<Mutex<Vec<(PathBuf, String, Option<String>)>>>;

fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn recording(options: PutDirectoryOptions) -> (PutDirectoryOptions, Ticks) {
    let ticks: Ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ticks);
    let options = options.tick(move |local: &Path, remote: &str, err: Option<&Error>| {
        sink.lock().unwrap().push((
            local.to_path_buf(),
            remote.to_string(),
            err.map(|e| e.to_string()),
        ));
    });
    (options, ticks)
}

fn numbered_tree(count: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for i in 1..=count {
        write_file(dir.path(), &format!("f{i:02}.txt"), &format!("file {i}"));
    }
    dir
}

#[tokio::test]
async fn test_put_directory_uploads_visible_tree() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "a.txt", "alpha");
    write_file(local.path(), "sub/b.txt", "beta");
    write_file(local.path(), "sub/deep/c.txt", "gamma");
    write_file(local.path(), ".env", "SECRET=1");
    write_file(local.path(), ".git/config", "[core]");

    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/srv");
    let (options, ticks) = recording(PutDirectoryOptions::default());

    let ok = put_directory(&transport, local.path(), "/srv/app", options)
        .await
        .unwrap();
    assert!(ok);

    let expected: BTreeSet<String> = [
        "/srv/app/a.txt",
        "/srv/app/sub/b.txt",
        "/srv/app/sub/deep/c.txt",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(transport.sftp.file_paths(), expected);
    assert_eq!(transport.sftp.file("/srv/app/sub/deep/c.txt").unwrap(), b"gamma");

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 3);
    assert!(ticks.iter().all(|(_, _, err)| err.is_none()));
    assert!(ticks.iter().all(|(_, remote, _)| !remote.contains('\\')));

    // Each directory is created exactly once.
    let created = transport.sftp.created_dirs();
    let unique: BTreeSet<&String> = created.iter().collect();
    assert_eq!(unique.len(), created.len());
    assert!(transport.sftp.has_dir("/srv/app/sub/deep"));
}

#[tokio::test]
async fn test_put_directory_custom_filter_and_non_recursive() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "app.conf", "x");
    write_file(local.path(), "debug.log", "y");
    write_file(local.path(), "nested/other.conf", "z");

    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/etc/app");
    let options = PutDirectoryOptions::default()
        .recursive(false)
        .validate(|path: &Path| path.extension().is_none_or(|ext| ext != "log"));

    assert!(put_directory(&transport, local.path(), "/etc/app", options)
        .await
        .unwrap());
    assert_eq!(
        transport.sftp.file_paths(),
        BTreeSet::from(["/etc/app/app.conf".to_string()])
    );
}

#[tokio::test]
async fn test_concurrent_siblings_create_parent_once() {
    let local = TempDir::new().unwrap();
    for name in ["one", "two", "three", "four"] {
        write_file(local.path(), &format!("sub/{name}.txt"), name);
    }

    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/srv");
    transport.sftp.set_put_delay(Duration::from_millis(5));

    let ok = put_directory(&transport, local.path(), "/srv/app", PutDirectoryOptions::default())
        .await
        .unwrap();
    assert!(ok);

    assert_eq!(transport.sftp.created_dirs(), vec!["/srv/app", "/srv/app/sub"]);
    assert_eq!(transport.sftp.file_paths().len(), 4);
    // No upload had to fall back to creating its parent.
    assert_eq!(transport.sftp.put_calls().len(), 4);
}

#[tokio::test]
async fn test_missing_parent_reported_by_message_only() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "x/y/z.txt", "deep");

    let sftp = Arc::new(FakeSftp::with_signal(MissingSignal::Message));
    let transport = FakeTransport::with_sftp(sftp);

    assert!(put_directory(&transport, local.path(), "/data", PutDirectoryOptions::default())
        .await
        .unwrap());
    assert_eq!(transport.sftp.file("/data/x/y/z.txt").unwrap(), b"deep");
    assert_eq!(
        transport.sftp.created_dirs(),
        vec!["/data", "/data/x", "/data/x/y"]
    );
}

#[tokio::test]
async fn test_partial_failure_reports_every_file() {
    let local = numbered_tree(10);
    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/srv/app");
    transport.sftp.fail_put("/srv/app/f05.txt");
    let (options, ticks) = recording(PutDirectoryOptions::default());

    let ok = put_directory(&transport, local.path(), "/srv/app", options)
        .await
        .unwrap();
    assert!(!ok);

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 10);
    let failed: Vec<&String> = ticks
        .iter()
        .filter(|(_, _, err)| err.is_some())
        .map(|(_, remote, _)| remote)
        .collect();
    assert_eq!(failed, vec!["/srv/app/f05.txt"]);
    assert_eq!(transport.sftp.file_paths().len(), 9);
}

#[tokio::test]
async fn test_uploads_run_in_non_overlapping_windows() {
    let local = numbered_tree(12);
    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/srv/app");
    transport.sftp.set_put_delay(Duration::from_millis(50));

    assert!(put_directory(&transport, local.path(), "/srv/app", PutDirectoryOptions::default())
        .await
        .unwrap());
    assert_eq!(transport.sftp.max_in_flight(), 5);

    let window_of = |remote: &str| -> usize {
        let n: usize = remote["/srv/app/f".len().."/srv/app/f".len() + 2]
            .parse()
            .unwrap();
        (n - 1) / 5
    };

    let events = transport.sftp.put_events();
    let mut sizes = [0usize; 3];
    for (position, event) in events.iter().enumerate() {
        if let PutEvent::Start(remote) = event {
            let window = window_of(remote);
            sizes[window] += 1;
            // Every upload of the previous window has finished.
            let finished_before = events[..position]
                .iter()
                .filter(|e| {
                    matches!(e, PutEvent::End(r) if window > 0 && window_of(r) == window - 1)
                })
                .count();
            if window > 0 {
                assert_eq!(finished_before, 5, "{remote} started early");
            }
        }
    }
    assert_eq!(sizes, [5, 5, 2]);
}

#[tokio::test]
async fn test_directory_creation_failure_fails_its_files() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "ok.txt", "fine");
    write_file(local.path(), "locked/a.txt", "a");
    write_file(local.path(), "locked/b.txt", "b");

    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/srv/app");
    transport.sftp.fail_mkdir("/srv/app/locked");
    let (options, ticks) = recording(PutDirectoryOptions::default());

    let ok = put_directory(&transport, local.path(), "/srv/app", options)
        .await
        .unwrap();
    assert!(!ok);

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 3);
    assert_eq!(ticks.iter().filter(|(_, _, err)| err.is_some()).count(), 2);
    assert_eq!(
        transport.sftp.file_paths(),
        BTreeSet::from(["/srv/app/ok.txt".to_string()])
    );
    // The shared creation ran once for both files.
    assert_eq!(
        transport
            .sftp
            .mkdir_calls()
            .iter()
            .filter(|p| *p == "/srv/app/locked")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_put_directory_argument_errors() {
    let transport = FakeTransport::new();
    let local = numbered_tree(1);

    let missing = local.path().join("nope");
    assert!(matches!(
        put_directory(&transport, &missing, "/srv", PutDirectoryOptions::default()).await,
        Err(Error::LocalNotFound(_))
    ));

    let file = local.path().join("f01.txt");
    assert!(matches!(
        put_directory(&transport, &file, "/srv", PutDirectoryOptions::default()).await,
        Err(Error::InvalidArgument(_))
    ));

    assert!(matches!(
        put_directory(
            &transport,
            local.path(),
            "/srv",
            PutDirectoryOptions::default().concurrency(0)
        )
        .await,
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(transport.sftp_opens(), 0);
}

#[tokio::test]
async fn test_caller_supplied_channel_stays_open() {
    let local = numbered_tree(2);
    let transport = FakeTransport::new();
    transport.sftp.seed_dir("/srv/app");

    let channel: Arc<dyn SftpChannel> = transport.sftp.clone();
    put_directory(
        &transport,
        local.path(),
        "/srv/app",
        PutDirectoryOptions::default().sftp(channel),
    )
    .await
    .unwrap();
    assert_eq!(transport.sftp_opens(), 0);
    assert_eq!(transport.sftp.end_calls(), 0);

    put_directory(&transport, local.path(), "/srv/app", PutDirectoryOptions::default())
        .await
        .unwrap();
    assert_eq!(transport.sftp_opens(), 1);
    assert_eq!(transport.sftp.end_calls(), 1);
}

#[tokio::test]
async fn test_get_directory_mirrors_remote_tree() {
    let transport = FakeTransport::new();
    transport.sftp.seed_file("/var/log/app/current.log", b"now");
    transport.sftp.seed_file("/var/log/app/archive/2024.log", b"then");
    transport.sftp.seed_file("/var/log/app/.lock", b"");

    let local = TempDir::new().unwrap();
    let target = local.path().join("logs");
    let ok = get_directory(&transport, "/var/log/app", &target, GetDirectoryOptions::default())
        .await
        .unwrap();
    assert!(ok);

    assert_eq!(fs::read(target.join("current.log")).unwrap(), b"now");
    assert_eq!(fs::read(target.join("archive").join("2024.log")).unwrap(), b"then");
    assert!(!target.join(".lock").exists());
    assert_eq!(transport.sftp.end_calls(), 1);
}

#[tokio::test]
async fn test_get_directory_rejects_remote_file() {
    let transport = FakeTransport::new();
    transport.sftp.seed_file("/etc/hosts", b"127.0.0.1 localhost");
    let local = TempDir::new().unwrap();

    let result =
        get_directory(&transport, "/etc/hosts", local.path(), GetDirectoryOptions::default()).await;
    assert!(matches!(result, Err(Error::RemoteNotADirectory(_))));
}
