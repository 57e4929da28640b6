// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fs::attributes::{
    AdditionalViews, AttributeValue, FileAttribute, PosixPermissions, UserPrincipal,
};
use crate::fs::builder::{CaseFoldTransform, CaseInsensitiveCollation};
use crate::fs::errors::{
    AccessError, AttributeError, CopyError, CreateError, DeleteError, OpenError, PatternError,
    ReadError, ReadLinkError, ResolveError, SeekError, WriteError,
};
use crate::fs::{AccessModes, CopyOptions, FileType, MemoryFileSystem, OpenOptions};
use crate::MemoryFileSystemBuilder;

fn new_fs() -> MemoryFileSystem {
    MemoryFileSystemBuilder::new()
        .build()
        .expect("Failed to build file system")
}

fn write_file(fs: &MemoryFileSystem, path: &str, data: &[u8]) {
    let mut channel = fs
        .new_byte_channel(path, OpenOptions::WRITE | OpenOptions::CREATE_NEW)
        .expect("Failed to create file");
    channel.write(data).expect("Failed to write file");
}

fn read_file(fs: &MemoryFileSystem, path: &str) -> Vec<u8> {
    let mut channel = fs
        .new_byte_channel(path, OpenOptions::READ)
        .expect("Failed to open file for reading");
    let mut data = Vec::new();
    let mut buffer = [0u8; 32];
    loop {
        let read = channel.read(&mut buffer).expect("Failed to read file");
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..read]);
    }
    data
}

fn list_names(fs: &MemoryFileSystem, path: &str) -> Vec<String> {
    fs.read_dir(path)
        .expect("Failed to list directory")
        .map(|entry| entry.file_name().expect("child path has a name").to_string())
        .collect()
}

mod creation {
    use super::*;

    #[test]
    fn create_directory_and_exists() {
        let fs = new_fs();
        fs.create_directory("/testdir")
            .expect("Failed to create directory");
        assert!(fs.exists("/testdir"));

        // Creating the same path again must fail.
        assert!(matches!(
            fs.create_directory("/testdir"),
            Err(CreateError::AlreadyExists(_)),
        ));
    }

    #[test]
    fn create_requires_existing_parent() {
        let fs = new_fs();
        assert!(matches!(
            fs.create_directory("/missing/child"),
            Err(CreateError::Resolve(ResolveError::NotFound(_))),
        ));
    }

    #[test]
    fn create_below_file_fails() {
        let fs = new_fs();
        write_file(&fs, "/file", b"x");
        assert!(matches!(
            fs.create_directory("/file/child"),
            Err(CreateError::Resolve(ResolveError::NotADirectory(_))),
        ));
    }

    #[test]
    fn create_root_fails() {
        let fs = new_fs();
        assert!(matches!(
            fs.create_directory("/"),
            Err(CreateError::AlreadyExists(_)),
        ));
    }

    #[test]
    fn nested_directories() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create /a");
        fs.create_directory("/a/b").expect("Failed to create /a/b");
        fs.create_directory("/a/b/c")
            .expect("Failed to create /a/b/c");
        assert!(fs.exists("/a/b/c"));
    }

    #[test]
    fn create_file_convenience() {
        let fs = new_fs();
        fs.create_file("/empty").expect("Failed to create file");
        assert_eq!(read_file(&fs, "/empty"), b"");
        assert!(matches!(
            fs.create_file("/empty"),
            Err(OpenError::AlreadyExists(_)),
        ));
    }

    #[test]
    fn initial_attributes() {
        let fs = MemoryFileSystemBuilder::linux()
            .build()
            .expect("Failed to build file system");
        fs.create_directory_with_attributes(
            "/locked",
            &[FileAttribute::new(
                "posix:permissions",
                AttributeValue::Permissions(PosixPermissions::from_bits_truncate(0o700)),
            )],
        )
        .expect("Failed to create directory with attributes");
        let attributes = fs
            .read_posix_attributes("/locked", true)
            .expect("Failed to read posix attributes");
        assert_eq!(
            attributes.permissions,
            PosixPermissions::from_bits_truncate(0o700),
        );
    }

    #[test]
    fn initial_timestamps_rejected() {
        let fs = new_fs();
        let error = fs
            .create_directory_with_attributes(
                "/stamped",
                &[FileAttribute::new(
                    "lastModifiedTime",
                    AttributeValue::Time(std::time::SystemTime::now()),
                )],
            )
            .expect_err("timestamps must not be accepted as initial attributes");
        assert!(matches!(error, CreateError::InitialAttribute(_)));
        assert!(!fs.exists("/stamped"));
    }

    #[test]
    fn read_only_file_system() {
        let fs = MemoryFileSystemBuilder::new()
            .read_only(true)
            .build()
            .expect("Failed to build file system");
        assert!(fs.is_read_only());
        assert!(matches!(
            fs.create_directory("/dir"),
            Err(CreateError::ReadOnly),
        ));
        assert!(matches!(
            fs.new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE),
            Err(OpenError::ReadOnly),
        ));
        assert!(matches!(fs.delete("/anything"), Err(DeleteError::ReadOnly)));
    }
}

mod deletion {
    use super::*;

    #[test]
    fn delete_then_gone() {
        let fs = new_fs();
        fs.create_directory("/dir").expect("Failed to create");
        fs.delete("/dir").expect("Failed to delete");
        assert!(!fs.exists("/dir"));

        // Deleting again must report the absence.
        assert!(matches!(
            fs.delete("/dir"),
            Err(DeleteError::Resolve(ResolveError::NotFound(_))),
        ));
    }

    #[test]
    fn delete_non_empty_directory_fails() {
        let fs = new_fs();
        fs.create_directory("/dir").expect("Failed to create");
        write_file(&fs, "/dir/file", b"data");
        assert!(matches!(
            fs.delete("/dir"),
            Err(DeleteError::NotEmpty(_)),
        ));
        fs.delete("/dir/file").expect("Failed to delete file");
        fs.delete("/dir").expect("Failed to delete emptied directory");
    }

    #[test]
    fn delete_root_fails() {
        let fs = new_fs();
        assert!(matches!(fs.delete("/"), Err(DeleteError::Busy(_))));
    }

    #[test]
    fn delete_open_file_fails_until_closed() {
        let fs = new_fs();
        let channel = fs
            .new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE_NEW)
            .expect("Failed to create file");
        assert!(matches!(fs.delete("/f"), Err(DeleteError::Busy(_))));
        drop(channel);
        fs.delete("/f").expect("Failed to delete closed file");
    }
}

mod channels {
    use super::*;
    use std::io::{Read as _, Seek as _, SeekFrom, Write as _};

    #[test]
    fn create_write_read_roundtrip() {
        let fs = MemoryFileSystemBuilder::new()
            .block_size(16)
            .build()
            .expect("Failed to build file system");
        fs.create_directory("/a").expect("Failed to create /a");

        write_file(&fs, "/a/b.txt", b"hello world!");

        let mut channel = fs
            .new_byte_channel("/a/b.txt", OpenOptions::READ)
            .expect("Failed to open for reading");
        assert_eq!(channel.size().expect("Failed to read size"), 12);
        let mut buffer = [0u8; 16];
        let read = channel.read(&mut buffer).expect("Failed to read");
        assert_eq!(&buffer[..read], b"hello world!");
        // End of file afterwards.
        assert_eq!(channel.read(&mut buffer).expect("Failed to read"), 0);
    }

    #[test]
    fn read_at_size_is_eof_and_write_at_size_grows() {
        let fs = new_fs();
        write_file(&fs, "/f", b"abc");
        let mut channel = fs
            .new_byte_channel("/f", OpenOptions::READ | OpenOptions::WRITE)
            .expect("Failed to open");
        channel.set_position(3).expect("Failed to position");
        let mut buffer = [0u8; 4];
        assert_eq!(channel.read(&mut buffer).expect("Failed to read"), 0);
        channel.write(b"def").expect("Failed to write at size");
        assert_eq!(channel.size().expect("Failed to read size"), 6);
        assert_eq!(read_file(&fs, "/f"), b"abcdef");
    }

    #[test]
    fn write_past_size_zero_fills() {
        let fs = new_fs();
        let mut channel = fs
            .new_byte_channel("/sparse", OpenOptions::WRITE | OpenOptions::CREATE_NEW)
            .expect("Failed to create");
        channel.set_position(5).expect("Failed to position");
        channel.write(b"x").expect("Failed to write");
        drop(channel);
        assert_eq!(read_file(&fs, "/sparse"), b"\0\0\0\0\0x");
    }

    #[test]
    fn append_forces_end_of_file() {
        let fs = new_fs();
        write_file(&fs, "/log", b"one");
        let mut channel = fs
            .new_byte_channel("/log", OpenOptions::APPEND)
            .expect("Failed to open for append");
        channel.write(b"two").expect("Failed to append");
        assert!(matches!(channel.set_position(0), Err(SeekError::Append)));
        channel.write(b"three").expect("Failed to append");
        drop(channel);
        assert_eq!(read_file(&fs, "/log"), b"onetwothree");
    }

    #[test]
    fn invalid_option_combinations() {
        let fs = new_fs();
        assert!(matches!(
            fs.new_byte_channel("/f", OpenOptions::APPEND | OpenOptions::READ),
            Err(OpenError::InvalidCombination(_)),
        ));
        assert!(matches!(
            fs.new_byte_channel(
                "/f",
                OpenOptions::APPEND | OpenOptions::TRUNCATE_EXISTING | OpenOptions::WRITE,
            ),
            Err(OpenError::InvalidCombination(_)),
        ));
        assert!(matches!(
            fs.new_byte_channel("/f", OpenOptions::from_bits_retain(1 << 20)),
            Err(OpenError::UnsupportedOption(_)),
        ));
    }

    #[test]
    fn sync_and_sparse_are_noops() {
        let fs = new_fs();
        let mut channel = fs
            .new_byte_channel(
                "/f",
                OpenOptions::WRITE
                    | OpenOptions::CREATE
                    | OpenOptions::SYNC
                    | OpenOptions::DSYNC
                    | OpenOptions::SPARSE,
            )
            .expect("Failed to open with no-op options");
        channel.write(b"ok").expect("Failed to write");
    }

    #[test]
    fn truncate_existing_clears_content() {
        let fs = new_fs();
        write_file(&fs, "/f", b"old content");
        let channel = fs
            .new_byte_channel(
                "/f",
                OpenOptions::WRITE | OpenOptions::TRUNCATE_EXISTING,
            )
            .expect("Failed to open with truncation");
        assert_eq!(channel.size().expect("Failed to read size"), 0);
    }

    #[test]
    fn open_directory_fails() {
        let fs = new_fs();
        fs.create_directory("/dir").expect("Failed to create");
        assert!(matches!(
            fs.new_byte_channel("/dir", OpenOptions::READ),
            Err(OpenError::IsDirectory(_)),
        ));
        assert!(matches!(
            fs.new_byte_channel("/", OpenOptions::READ),
            Err(OpenError::IsDirectory(_)),
        ));
    }

    #[test]
    fn access_direction_is_enforced() {
        let fs = new_fs();
        write_file(&fs, "/f", b"data");
        let mut writer = fs
            .new_byte_channel("/f", OpenOptions::WRITE)
            .expect("Failed to open for writing");
        let mut buffer = [0u8; 4];
        assert!(matches!(
            writer.read(&mut buffer),
            Err(ReadError::NotReadable),
        ));
        let mut reader = fs
            .new_byte_channel("/f", OpenOptions::READ)
            .expect("Failed to open for reading");
        assert!(matches!(reader.write(b"nope"), Err(WriteError::NotWritable)));
    }

    #[test]
    fn missing_file_without_create_fails() {
        let fs = new_fs();
        assert!(matches!(
            fs.new_byte_channel("/missing", OpenOptions::READ),
            Err(OpenError::Resolve(ResolveError::NotFound(_))),
        ));
    }

    #[test]
    fn create_new_on_existing_fails() {
        let fs = new_fs();
        write_file(&fs, "/f", b"data");
        assert!(matches!(
            fs.new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE_NEW),
            Err(OpenError::AlreadyExists(_)),
        ));
        // Plain CREATE opens the existing file instead.
        let channel = fs
            .new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE)
            .expect("Failed to open existing file with CREATE");
        assert_eq!(channel.size().expect("Failed to read size"), 4);
    }

    #[test]
    fn delete_on_close_detaches_the_file() {
        let fs = new_fs();
        let mut channel = fs
            .new_byte_channel(
                "/scratch",
                OpenOptions::WRITE | OpenOptions::CREATE_NEW | OpenOptions::DELETE_ON_CLOSE,
            )
            .expect("Failed to create");
        channel.write(b"temporary").expect("Failed to write");
        assert!(fs.exists("/scratch"));
        drop(channel);
        assert!(!fs.exists("/scratch"));
    }

    #[test]
    fn close_is_idempotent() {
        let fs = new_fs();
        let mut channel = fs
            .new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE_NEW)
            .expect("Failed to create");
        channel.close();
        channel.close();
        assert!(matches!(channel.write(b"x"), Err(WriteError::ChannelClosed)));
        fs.delete("/f").expect("Failed to delete after close");
    }

    #[test]
    fn streams_wrap_channels() {
        let fs = new_fs();
        let mut out = fs
            .new_output_stream("/greeting")
            .expect("Failed to open output stream");
        out.write_all(b"hello stream").expect("Failed to write");
        drop(out);

        // The output stream truncates existing content.
        let mut out = fs
            .new_output_stream("/greeting")
            .expect("Failed to reopen output stream");
        out.write_all(b"short").expect("Failed to write");
        drop(out);

        let mut text = String::new();
        fs.new_input_stream("/greeting")
            .expect("Failed to open input stream")
            .read_to_string(&mut text)
            .expect("Failed to read stream");
        assert_eq!(text, "short");
    }

    #[test]
    fn seeking_through_the_io_trait() {
        let fs = new_fs();
        write_file(&fs, "/f", b"0123456789");
        let mut channel = fs
            .new_byte_channel("/f", OpenOptions::READ)
            .expect("Failed to open");
        channel.seek(SeekFrom::End(-2)).expect("Failed to seek");
        let mut tail = String::new();
        channel
            .read_to_string(&mut tail)
            .expect("Failed to read tail");
        assert_eq!(tail, "89");
        assert!(channel.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn two_channels_have_independent_cursors() {
        let fs = new_fs();
        write_file(&fs, "/f", b"abcdef");
        let mut first = fs
            .new_byte_channel("/f", OpenOptions::READ)
            .expect("Failed to open first channel");
        let mut second = fs
            .new_byte_channel("/f", OpenOptions::READ)
            .expect("Failed to open second channel");
        let mut buffer = [0u8; 3];
        first.read(&mut buffer).expect("Failed to read");
        assert_eq!(&buffer, b"abc");
        second.read(&mut buffer).expect("Failed to read");
        assert_eq!(&buffer, b"abc");
    }
}

mod symlinks {
    use super::*;

    #[test]
    fn follow_terminal_link() {
        let fs = new_fs();
        write_file(&fs, "/target", b"through the link");
        fs.create_symbolic_link("/link", "/target")
            .expect("Failed to create symlink");

        let attributes = fs
            .read_basic_attributes("/link", true)
            .expect("Failed to read attributes through link");
        assert!(attributes.is_regular_file());
        assert_eq!(read_file(&fs, "/link"), b"through the link");
    }

    #[test]
    fn terminal_link_not_followed_on_request() {
        let fs = new_fs();
        write_file(&fs, "/target", b"x");
        fs.create_symbolic_link("/link", "/target")
            .expect("Failed to create symlink");
        let attributes = fs
            .read_basic_attributes("/link", false)
            .expect("Failed to read link attributes");
        assert!(attributes.is_symbolic_link());
        assert_eq!(attributes.file_type, FileType::SymbolicLink);
    }

    #[test]
    fn link_cycle_is_detected() {
        let fs = new_fs();
        fs.create_symbolic_link("/l1", "/l2")
            .expect("Failed to create /l1");
        fs.create_symbolic_link("/l2", "/l1")
            .expect("Failed to create /l2");
        assert!(matches!(
            fs.read_basic_attributes("/l1", true),
            Err(AttributeError::Resolve(ResolveError::Loop(_))),
        ));
    }

    #[test]
    fn long_chain_without_cycle_terminates() {
        let fs = new_fs();
        write_file(&fs, "/end", b"x");
        let mut previous = "/end".to_string();
        for i in 0..16 {
            let link = format!("/chain{i}");
            fs.create_symbolic_link(&link, &previous)
                .expect("Failed to create chain link");
            previous = link;
        }
        assert!(fs.exists(&previous));
    }

    #[test]
    fn intermediate_links_are_always_chased() {
        let fs = new_fs();
        fs.create_directory("/dir").expect("Failed to create");
        write_file(&fs, "/dir/file", b"payload");
        fs.create_symbolic_link("/shortcut", "/dir")
            .expect("Failed to create symlink");

        assert_eq!(read_file(&fs, "/shortcut/file"), b"payload");
        // Even when the terminal element is not followed.
        let attributes = fs
            .read_basic_attributes("/shortcut/file", false)
            .expect("Failed to read through intermediate link");
        assert!(attributes.is_regular_file());
    }

    #[test]
    fn relative_targets_resolve_against_the_link_parent() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create /a");
        fs.create_directory("/b").expect("Failed to create /b");
        write_file(&fs, "/b/data", b"found");
        fs.create_symbolic_link("/a/link", "../b/data")
            .expect("Failed to create relative symlink");
        assert_eq!(read_file(&fs, "/a/link"), b"found");
    }

    #[test]
    fn read_symbolic_link_returns_the_target() {
        let fs = new_fs();
        fs.create_symbolic_link("/link", "/somewhere")
            .expect("Failed to create symlink");
        let target = fs
            .read_symbolic_link("/link")
            .expect("Failed to read symlink");
        assert_eq!(target.to_string(), "/somewhere");

        write_file(&fs, "/file", b"x");
        assert!(matches!(
            fs.read_symbolic_link("/file"),
            Err(ReadLinkError::NotALink(_)),
        ));
    }

    #[test]
    fn dangling_link() {
        let fs = new_fs();
        fs.create_symbolic_link("/dangling", "/nowhere")
            .expect("Failed to create symlink");
        assert!(!fs.exists("/dangling"));
        assert!(matches!(
            fs.new_byte_channel("/dangling", OpenOptions::READ),
            Err(OpenError::Resolve(ResolveError::NotFound(_))),
        ));
        // The link itself is still there.
        assert!(fs
            .read_basic_attributes("/dangling", false)
            .expect("Failed to read link attributes")
            .is_symbolic_link());
    }

    #[test]
    fn create_through_link_to_parent() {
        let fs = new_fs();
        fs.create_directory("/real").expect("Failed to create");
        fs.create_symbolic_link("/alias", "/real")
            .expect("Failed to create symlink");
        write_file(&fs, "/alias/made", b"via alias");
        assert_eq!(read_file(&fs, "/real/made"), b"via alias");
    }
}

mod moving {
    use super::*;

    #[test]
    fn move_preserves_content() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create");
        fs.create_directory("/b").expect("Failed to create");
        write_file(&fs, "/a/file", b"payload stays intact");
        fs.rename("/a/file", "/b/moved", CopyOptions::empty())
            .expect("Failed to move file");
        assert!(!fs.exists("/a/file"));
        assert_eq!(read_file(&fs, "/b/moved"), b"payload stays intact");
    }

    #[test]
    fn move_directory_with_replace() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create /a");
        write_file(&fs, "/a/x", b"x");
        fs.create_directory("/b").expect("Failed to create /b");

        fs.rename("/a", "/b", CopyOptions::REPLACE_EXISTING)
            .expect("Failed to move directory over empty directory");
        assert!(fs.exists("/b/x"));
        assert!(!fs.exists("/a"));
    }

    #[test]
    fn move_without_replace_fails_on_existing_target() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create");
        write_file(&fs, "/a/x", b"x");
        fs.create_directory("/b").expect("Failed to create");
        assert!(matches!(
            fs.rename("/a", "/b", CopyOptions::empty()),
            Err(CopyError::AlreadyExists(_)),
        ));
    }

    #[test]
    fn replace_of_non_empty_directory_fails() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create");
        fs.create_directory("/b").expect("Failed to create");
        write_file(&fs, "/b/occupied", b"x");
        assert!(matches!(
            fs.rename("/a", "/b", CopyOptions::REPLACE_EXISTING),
            Err(CopyError::NotEmpty(_)),
        ));
    }

    #[test]
    fn replace_existing_file() {
        let fs = new_fs();
        write_file(&fs, "/old", b"old");
        write_file(&fs, "/new", b"new");
        fs.rename("/new", "/old", CopyOptions::REPLACE_EXISTING)
            .expect("Failed to replace file");
        assert_eq!(read_file(&fs, "/old"), b"new");
        assert!(!fs.exists("/new"));
    }

    #[test]
    fn move_onto_itself_is_a_noop() {
        let fs = new_fs();
        write_file(&fs, "/f", b"data");
        fs.rename("/f", "/f", CopyOptions::empty())
            .expect("Failed to move onto itself");
        assert_eq!(read_file(&fs, "/f"), b"data");
    }

    #[test]
    fn move_into_own_subtree_fails() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create");
        fs.create_directory("/a/b").expect("Failed to create");
        assert!(matches!(
            fs.rename("/a", "/a/b/c", CopyOptions::empty()),
            Err(CopyError::IntoSelf),
        ));
    }

    #[test]
    fn move_root_fails() {
        let fs = new_fs();
        assert!(matches!(
            fs.rename("/", "/elsewhere", CopyOptions::empty()),
            Err(CopyError::RootNotAllowed),
        ));
    }

    #[test]
    fn rename_within_a_directory() {
        let fs = new_fs();
        write_file(&fs, "/before", b"same bytes");
        fs.rename("/before", "/after", CopyOptions::empty())
            .expect("Failed to rename");
        assert!(!fs.exists("/before"));
        assert_eq!(read_file(&fs, "/after"), b"same bytes");
        assert_eq!(super::list_names(&fs, "/"), vec!["after"]);
    }

    #[test]
    fn copy_leaves_the_source() {
        let fs = new_fs();
        write_file(&fs, "/src", b"duplicated");
        fs.copy("/src", "/dst", CopyOptions::empty())
            .expect("Failed to copy");
        assert_eq!(read_file(&fs, "/src"), b"duplicated");
        assert_eq!(read_file(&fs, "/dst"), b"duplicated");

        // Diverge afterwards: the copy is deep.
        let mut channel = fs
            .new_byte_channel("/dst", OpenOptions::WRITE)
            .expect("Failed to open copy");
        channel.write(b"DUP").expect("Failed to write");
        drop(channel);
        assert_eq!(read_file(&fs, "/src"), b"duplicated");
    }

    #[test]
    fn copy_directory_copies_it_empty() {
        let fs = new_fs();
        fs.create_directory("/full").expect("Failed to create");
        write_file(&fs, "/full/child", b"x");
        fs.copy("/full", "/shallow", CopyOptions::empty())
            .expect("Failed to copy directory");
        assert!(fs.exists("/shallow"));
        assert!(!fs.exists("/shallow/child"));
        assert!(fs.exists("/full/child"));
    }

    #[test]
    fn copy_symlink_copies_the_link() {
        let fs = new_fs();
        write_file(&fs, "/target", b"x");
        fs.create_symbolic_link("/link", "/target")
            .expect("Failed to create symlink");
        fs.copy("/link", "/link2", CopyOptions::empty())
            .expect("Failed to copy symlink");
        assert_eq!(
            fs.read_symbolic_link("/link2")
                .expect("Failed to read copied link")
                .to_string(),
            "/target",
        );
    }

    #[test]
    fn copy_attributes_carries_permissions() {
        let fs = MemoryFileSystemBuilder::linux()
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "/src", b"x");
        let wanted = PosixPermissions::from_bits_truncate(0o600);
        fs.posix_view("/src", true)
            .expect("posix view must be configured")
            .set_permissions(wanted)
            .expect("Failed to set permissions");

        fs.copy("/src", "/with", CopyOptions::COPY_ATTRIBUTES)
            .expect("Failed to copy with attributes");
        fs.copy("/src", "/without", CopyOptions::empty())
            .expect("Failed to copy without attributes");

        let with = fs
            .read_posix_attributes("/with", true)
            .expect("Failed to read attributes");
        let without = fs
            .read_posix_attributes("/without", true)
            .expect("Failed to read attributes");
        assert_eq!(with.permissions, wanted);
        assert_eq!(
            without.permissions,
            PosixPermissions::from_bits_truncate(0o644),
        );
    }

    #[test]
    fn cross_file_system_copy_and_move() {
        let first = MemoryFileSystemBuilder::new()
            .key("alpha")
            .build()
            .expect("Failed to build first file system");
        let second = MemoryFileSystemBuilder::new()
            .key("beta")
            .build()
            .expect("Failed to build second file system");

        write_file(&first, "/f", b"travels");
        first
            .copy_to("/f", &second, "/copied", CopyOptions::empty())
            .expect("Failed to copy across file systems");
        assert_eq!(read_file(&second, "/copied"), b"travels");
        assert!(first.exists("/f"));

        first
            .move_to("/f", &second, "/moved", CopyOptions::empty())
            .expect("Failed to move across file systems");
        assert_eq!(read_file(&second, "/moved"), b"travels");
        assert!(!first.exists("/f"));
    }

    #[test]
    fn cross_file_system_move_of_non_empty_directory_fails() {
        let first = MemoryFileSystemBuilder::new()
            .key("gamma")
            .build()
            .expect("Failed to build first file system");
        let second = MemoryFileSystemBuilder::new()
            .key("delta")
            .build()
            .expect("Failed to build second file system");
        first.create_directory("/dir").expect("Failed to create");
        write_file(&first, "/dir/child", b"x");
        assert!(matches!(
            first.move_to("/dir", &second, "/dir", CopyOptions::empty()),
            Err(CopyError::NotEmpty(_)),
        ));
    }
}

mod attributes {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn basic_attributes() {
        let fs = new_fs();
        write_file(&fs, "/f", b"12345");
        let attributes = fs
            .read_basic_attributes("/f", true)
            .expect("Failed to read attributes");
        assert!(attributes.is_regular_file());
        assert_eq!(attributes.size, 5);
        assert!(attributes.last_modified_time >= attributes.creation_time);

        fs.create_directory("/d").expect("Failed to create");
        assert!(fs
            .read_basic_attributes("/d", true)
            .expect("Failed to read attributes")
            .is_directory());
    }

    #[test]
    fn file_keys_are_stable_and_unique() {
        let fs = new_fs();
        write_file(&fs, "/a", b"");
        write_file(&fs, "/b", b"");
        let a = fs
            .read_basic_attributes("/a", true)
            .expect("Failed to read attributes")
            .file_key;
        let b = fs
            .read_basic_attributes("/b", true)
            .expect("Failed to read attributes")
            .file_key;
        assert_ne!(a, b);
        let a_again = fs
            .read_basic_attributes("/a", true)
            .expect("Failed to read attributes")
            .file_key;
        assert_eq!(a, a_again);
    }

    #[test]
    fn set_times_atomically() {
        let fs = new_fs();
        write_file(&fs, "/f", b"x");
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let view = fs.basic_view("/f", true);
        view.set_times(Some(stamp), Some(stamp), Some(stamp))
            .expect("Failed to set times");
        let attributes = view.read_attributes().expect("Failed to read attributes");
        assert_eq!(attributes.last_modified_time, stamp);
        assert_eq!(attributes.creation_time, stamp);

        // Every argument is required.
        assert!(matches!(
            view.set_times(Some(stamp), None, Some(stamp)),
            Err(AttributeError::InvalidValue(_)),
        ));
    }

    #[test]
    fn unconfigured_views_are_rejected() {
        let fs = new_fs();
        write_file(&fs, "/f", b"x");
        assert!(matches!(
            fs.dos_view("/f", true),
            Err(AttributeError::ViewNotSupported(_)),
        ));
        assert!(matches!(
            fs.read_posix_attributes("/f", true),
            Err(AttributeError::ViewNotSupported(_)),
        ));
        assert!(matches!(
            fs.read_attributes("/f", "posix:*", true),
            Err(AttributeError::ViewNotSupported(_)),
        ));
        let views: Vec<&str> = fs
            .supported_file_attribute_views()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(views, vec!["basic"]);
    }

    #[test]
    fn dos_flags() {
        let fs = MemoryFileSystemBuilder::windows()
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "C:\\f", b"x");
        let view = fs.dos_view("C:\\f", true).expect("dos view configured");
        view.set_hidden(true).expect("Failed to set hidden");
        view.set_read_only(true).expect("Failed to set read-only");
        let attributes = view.read_attributes().expect("Failed to read attributes");
        assert!(attributes
            .flags
            .contains(crate::fs::attributes::DosFlags::HIDDEN));
        assert!(fs.is_hidden("C:\\f").expect("Failed to check hidden"));
    }

    #[test]
    fn posix_owner_group_permissions() {
        let fs = MemoryFileSystemBuilder::linux()
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "/f", b"x");
        let view = fs.posix_view("/f", true).expect("posix view configured");
        // umask 022 applied to rw-rw-rw-.
        assert_eq!(
            view.permissions().expect("Failed to read permissions"),
            PosixPermissions::from_bits_truncate(0o644),
        );
        view.set_owner(UserPrincipal::named("alice"))
            .expect("Failed to set owner");
        assert_eq!(
            view.owner().expect("Failed to read owner").name(),
            "alice",
        );
    }

    #[test]
    fn attributes_by_name() {
        let fs = MemoryFileSystemBuilder::linux()
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "/f", b"abcde");
        let values = fs
            .read_attributes("/f", "posix:*", true)
            .expect("Failed to read attributes");
        assert_eq!(values["size"], AttributeValue::Size(5));
        assert_eq!(
            values["permissions"],
            AttributeValue::Permissions(PosixPermissions::from_bits_truncate(0o644)),
        );

        let values = fs
            .read_attributes("/f", "size,isDirectory", true)
            .expect("Failed to read selected attributes");
        assert_eq!(values.len(), 2);
        assert_eq!(values["isDirectory"], AttributeValue::Bool(false));

        fs.set_attribute(
            "/f",
            "posix:permissions",
            AttributeValue::Permissions(PosixPermissions::from_bits_truncate(0o400)),
            true,
        )
        .expect("Failed to set attribute by name");
        assert_eq!(
            fs.read_posix_attributes("/f", true)
                .expect("Failed to read attributes")
                .permissions,
            PosixPermissions::from_bits_truncate(0o400),
        );

        assert!(matches!(
            fs.read_attributes("/f", "posix:doesNotExist", true),
            Err(AttributeError::UnknownAttribute(_)),
        ));
        assert!(matches!(
            fs.set_attribute("/f", "size", AttributeValue::Size(0), true),
            Err(AttributeError::NotSettable(_)),
        ));
    }

    #[test]
    fn user_defined_attributes() {
        let fs = MemoryFileSystemBuilder::new()
            .additional_views(AdditionalViews::USER)
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "/f", b"x");
        let view = fs.user_view("/f", true).expect("user view configured");
        assert!(view.list().expect("Failed to list").is_empty());

        view.write("mime", b"text/plain").expect("Failed to write");
        assert_eq!(view.size("mime").expect("Failed to size"), 10);
        let mut buffer = [0u8; 16];
        let read = view.read("mime", &mut buffer).expect("Failed to read");
        assert_eq!(&buffer[..read], b"text/plain");

        let mut small = [0u8; 4];
        assert!(matches!(
            view.read("mime", &mut small),
            Err(AttributeError::BufferTooSmall { .. }),
        ));
        assert!(matches!(
            view.size("missing"),
            Err(AttributeError::NotPresent(_)),
        ));

        view.delete("mime").expect("Failed to delete");
        assert!(view.list().expect("Failed to list").is_empty());
        // Deleting an absent attribute stays silent.
        view.delete("mime").expect("Failed to delete again");
    }

    #[test]
    fn user_defined_attributes_by_name() {
        let fs = MemoryFileSystemBuilder::new()
            .additional_views(AdditionalViews::USER)
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "/f", b"x");
        fs.set_attribute(
            "/f",
            "user:origin",
            AttributeValue::Bytes(b"unit-test".to_vec()),
            true,
        )
        .expect("Failed to set user attribute");
        let values = fs
            .read_attributes("/f", "user:origin", true)
            .expect("Failed to read user attribute");
        assert_eq!(
            values["origin"],
            AttributeValue::Bytes(b"unit-test".to_vec()),
        );
        assert!(matches!(
            fs.read_attributes("/f", "user:absent", true),
            Err(AttributeError::NotPresent(_)),
        ));
    }

    #[test]
    fn check_access_modes() {
        let fs = new_fs();
        write_file(&fs, "/f", b"x");
        fs.check_access("/f", AccessModes::READ | AccessModes::WRITE | AccessModes::EXECUTE)
            .expect("Failed to check access");
        assert!(matches!(
            fs.check_access("/f", AccessModes::from_bits_retain(1 << 6)),
            Err(AccessError::UnsupportedMode(_)),
        ));
        assert!(matches!(
            fs.check_access("/missing", AccessModes::READ),
            Err(AccessError::Resolve(ResolveError::NotFound(_))),
        ));
    }
}

mod lookup {
    use super::*;

    #[test]
    fn real_path_is_idempotent() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create");
        write_file(&fs, "/a/f", b"x");
        let real = fs
            .to_real_path("/a/./f", true)
            .expect("Failed to resolve real path");
        assert_eq!(real.to_string(), "/a/f");
        let again = fs
            .to_real_path(&real, true)
            .expect("Failed to resolve twice");
        assert_eq!(real, again);
    }

    #[test]
    fn real_path_expands_links() {
        let fs = new_fs();
        fs.create_directory("/real").expect("Failed to create");
        write_file(&fs, "/real/f", b"x");
        fs.create_symbolic_link("/alias", "/real")
            .expect("Failed to create symlink");
        let real = fs
            .to_real_path("/alias/f", true)
            .expect("Failed to resolve");
        assert_eq!(real.to_string(), "/real/f");
    }

    #[test]
    fn case_insensitive_lookup_preserves_display_case() {
        let fs = MemoryFileSystemBuilder::new()
            .lookup_transform(CaseFoldTransform)
            .collation(CaseInsensitiveCollation)
            .build()
            .expect("Failed to build file system");
        fs.create_directory("/Foo").expect("Failed to create");
        assert!(fs.exists("/foo"));
        assert!(fs.exists("/FOO"));
        assert_eq!(list_names(&fs, "/"), vec!["Foo"]);

        write_file(&fs, "/Foo/Bar.TXT", b"case");
        assert_eq!(read_file(&fs, "/foo/bar.txt"), b"case");
        assert_eq!(
            fs.to_real_path("/FOO/BAR.txt", true)
                .expect("Failed to resolve")
                .to_string(),
            "/Foo/Bar.TXT",
        );
    }

    #[test]
    fn directory_stream_snapshots_in_insertion_order() {
        let fs = new_fs();
        fs.create_directory("/dir").expect("Failed to create");
        write_file(&fs, "/dir/zeta", b"");
        write_file(&fs, "/dir/alpha", b"");
        fs.create_directory("/dir/midway")
            .expect("Failed to create");

        let names = list_names(&fs, "/dir");
        assert_eq!(names, vec!["zeta", "alpha", "midway"]);

        // The stream paths are full child paths.
        let paths: Vec<String> = fs
            .read_dir("/dir")
            .expect("Failed to list")
            .map(|path| path.to_string())
            .collect();
        assert_eq!(paths, vec!["/dir/zeta", "/dir/alpha", "/dir/midway"]);
    }

    #[test]
    fn directory_stream_filters_lazily() {
        let fs = new_fs();
        write_file(&fs, "/a.rs", b"");
        write_file(&fs, "/b.txt", b"");
        write_file(&fs, "/c.rs", b"");
        let matcher = fs
            .get_path_matcher("glob:/*.rs")
            .expect("Failed to compile matcher");
        let matched: Vec<String> = fs
            .new_directory_stream("/", |path| matcher.matches(path))
            .expect("Failed to open stream")
            .map(|path| path.to_string())
            .collect();
        assert_eq!(matched, vec!["/a.rs", "/c.rs"]);
    }

    #[test]
    fn stream_of_non_directory_fails() {
        let fs = new_fs();
        write_file(&fs, "/f", b"x");
        assert!(matches!(
            fs.read_dir("/f"),
            Err(crate::fs::errors::LookupError::Resolve(
                ResolveError::NotADirectory(_),
            )),
        ));
    }

    #[test]
    fn empty_root_and_trailing_separator_resolve_to_the_root() {
        let fs = new_fs();
        assert!(fs
            .read_basic_attributes("", true)
            .expect("Failed to resolve empty path")
            .is_directory());
        assert!(fs
            .read_basic_attributes("/", true)
            .expect("Failed to resolve root")
            .is_directory());
        fs.create_directory("/a").expect("Failed to create");
        assert_eq!(
            fs.to_real_path("/a/", true)
                .expect("Failed to resolve trailing separator")
                .to_string(),
            "/a",
        );
        assert_eq!(fs.to_real_path("/", true).expect("root").to_string(), "/");
    }

    #[test]
    fn relative_paths_resolve_against_the_working_directory() {
        let fs = MemoryFileSystemBuilder::new()
            .current_working_directory("/work")
            .build()
            .expect("Failed to build file system");
        // The working directory itself has to be created first; only the
        // roots exist initially.
        fs.create_directory("/work").expect("Failed to create");
        write_file(&fs, "data.txt", b"relative");
        assert_eq!(read_file(&fs, "/work/data.txt"), b"relative");
        assert_eq!(read_file(&fs, "./data.txt"), b"relative");
        assert_eq!(read_file(&fs, "../work/data.txt"), b"relative");
    }

    #[test]
    fn hidden_files_on_posix() {
        let fs = MemoryFileSystemBuilder::linux()
            .build()
            .expect("Failed to build file system");
        write_file(&fs, "/.profile", b"x");
        write_file(&fs, "/visible", b"x");
        assert!(fs.is_hidden("/.profile").expect("Failed to check"));
        assert!(!fs.is_hidden("/visible").expect("Failed to check"));
    }

    #[test]
    fn path_matcher_errors() {
        let fs = new_fs();
        assert!(matches!(
            fs.get_path_matcher("noColon"),
            Err(PatternError::MissingSyntax(_)),
        ));
        assert!(matches!(
            fs.get_path_matcher("ant:pattern"),
            Err(PatternError::UnsupportedSyntax(_)),
        ));
        assert!(fs.get_path_matcher("regex:^/a/.*$").is_ok());
    }

    #[test]
    fn roots_and_separator() {
        let fs = new_fs();
        assert_eq!(fs.separator(), "/");
        let roots = fs.get_root_directories();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].to_string(), "/");
    }

    #[test]
    fn get_path_joins_elements() {
        let fs = new_fs();
        let path = fs.get_path("/a", &["b", "c"]);
        assert_eq!(path.to_string(), "/a/b/c");
        assert_eq!(fs.get_path("/a//b/./c", &[]), path);
    }
}

mod windows_flavor {
    use super::*;

    #[test]
    fn windows_paths() {
        let fs = MemoryFileSystemBuilder::windows()
            .build()
            .expect("Failed to build file system");
        assert_eq!(fs.separator(), "\\");
        assert_eq!(fs.get_root_directories()[0].to_string(), "C:\\");

        fs.create_directory("C:\\Temp").expect("Failed to create");
        write_file(&fs, "C:\\Temp\\File.txt", b"windows");
        // Lookups are case-insensitive, including the root key.
        assert_eq!(read_file(&fs, "c:\\temp\\file.txt"), b"windows");
        assert_eq!(
            fs.to_real_path("c:\\TEMP\\FILE.TXT", true)
                .expect("Failed to resolve")
                .to_string(),
            "C:\\Temp\\File.txt",
        );
    }

    #[test]
    fn multiple_roots() {
        let fs = MemoryFileSystemBuilder::windows()
            .add_root("D:\\")
            .build()
            .expect("Failed to build file system");
        fs.create_directory("D:\\data").expect("Failed to create");
        assert!(fs.exists("D:\\data"));
        assert!(!fs.exists("C:\\data"));
        assert_eq!(fs.get_root_directories().len(), 2);
    }
}

mod store {
    use super::*;

    #[test]
    fn capacity_ceiling_is_enforced() {
        let fs = MemoryFileSystemBuilder::new()
            .block_size(16)
            .capacity(64)
            .build()
            .expect("Failed to build file system");
        let mut channel = fs
            .new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE_NEW)
            .expect("Failed to create");
        channel.write(&[0u8; 64]).expect("Failed to fill the store");
        assert!(matches!(
            channel.write(b"overflow"),
            Err(WriteError::StoreFull(_)),
        ));
        drop(channel);

        let store = fs.get_file_store();
        assert_eq!(store.total_space(), Some(64));
        assert_eq!(store.used_space(), 64);
        assert_eq!(store.available_space(), Some(0));

        // Deleting releases the blocks.
        fs.delete("/f").expect("Failed to delete");
        assert_eq!(fs.get_file_store().used_space(), 0);
    }

    #[test]
    fn store_metadata() {
        let fs = MemoryFileSystemBuilder::new()
            .key("scratch")
            .build()
            .expect("Failed to build file system");
        let store = fs.get_file_store();
        assert_eq!(store.name(), "scratch");
        assert_eq!(store.block_size(), 4096);
        assert!(!store.is_read_only());
        assert_eq!(store.total_space(), None);
    }
}

mod closing {
    use super::*;

    #[test]
    fn operations_fail_after_close() {
        let fs = new_fs();
        fs.create_directory("/dir").expect("Failed to create");
        assert!(fs.is_open());
        fs.close();
        fs.close(); // closing twice is allowed
        assert!(!fs.is_open());

        assert!(matches!(
            fs.create_directory("/other"),
            Err(CreateError::Closed(_)),
        ));
        assert!(matches!(fs.delete("/dir"), Err(DeleteError::Closed(_))));
        assert!(matches!(
            fs.new_byte_channel("/dir/f", OpenOptions::READ),
            Err(OpenError::Closed(_)),
        ));
        assert!(matches!(
            fs.read_basic_attributes("/dir", true),
            Err(AttributeError::Closed(_)),
        ));
        assert!(matches!(
            fs.get_path_matcher("glob:*"),
            Err(PatternError::Closed(_)),
        ));
        assert!(!fs.exists("/dir"));
    }

    #[test]
    fn open_channels_fail_after_close() {
        let fs = new_fs();
        let mut channel = fs
            .new_byte_channel("/f", OpenOptions::WRITE | OpenOptions::CREATE_NEW)
            .expect("Failed to create");
        fs.close();
        assert!(matches!(channel.write(b"x"), Err(WriteError::Closed(_))));
    }
}

mod builder_validation {
    use super::*;
    use crate::fs::errors::BuildError;

    #[test]
    fn invalid_configurations_are_rejected() {
        assert!(matches!(
            MemoryFileSystemBuilder::new().separator("").build(),
            Err(BuildError::EmptySeparator),
        ));
        assert!(matches!(
            MemoryFileSystemBuilder::new().block_size(0).build(),
            Err(BuildError::ZeroBlockSize),
        ));
        assert!(matches!(
            MemoryFileSystemBuilder::new()
                .roots(Vec::<String>::new())
                .build(),
            Err(BuildError::NoRoots),
        ));
        assert!(matches!(
            MemoryFileSystemBuilder::new().roots(["C:"]).build(),
            Err(BuildError::InvalidRoot(_, _)),
        ));
        assert!(matches!(
            MemoryFileSystemBuilder::new().roots(["/", "/"]).build(),
            Err(BuildError::DuplicateRoot(_)),
        ));
        assert!(matches!(
            MemoryFileSystemBuilder::new()
                .current_working_directory("relative/path")
                .build(),
            Err(BuildError::RelativeWorkingDirectory(_)),
        ));
    }

    #[test]
    fn case_folded_duplicate_roots_are_rejected() {
        assert!(matches!(
            MemoryFileSystemBuilder::windows()
                .add_root("c:\\")
                .build(),
            Err(BuildError::DuplicateRoot(_)),
        ));
    }
}

mod concurrency {
    use super::*;
    use std::thread;

    fn xorshift(state: &mut u64) -> u64 {
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        x
    }

    #[test]
    fn concurrent_creates_lose_nothing() {
        let fs = new_fs();
        fs.create_directory("/shared").expect("Failed to create");
        let threads: Vec<_> = (0..16)
            .map(|thread_index| {
                let fs = fs.clone();
                thread::spawn(move || {
                    for file_index in 0..8 {
                        write_file(&fs, &format!("/shared/t{thread_index}-{file_index}"), b"x");
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().expect("creator thread panicked");
        }
        let mut names = list_names(&fs, "/shared");
        names.sort_unstable();
        assert_eq!(names.len(), 16 * 8);
        names.dedup();
        assert_eq!(names.len(), 16 * 8);
    }

    #[test]
    fn concurrent_moves_terminate_and_stay_consistent() {
        let fs = new_fs();
        const DIRS: usize = 4;
        const FILES: usize = 10;
        for dir in 0..DIRS {
            fs.create_directory(format!("/d{dir}"))
                .expect("Failed to create directory");
        }
        for file in 0..FILES {
            write_file(&fs, &format!("/d0/f{file}"), format!("payload {file}").as_bytes());
        }

        // 8 workers x 125 random moves = 1000 two-path operations.
        let threads: Vec<_> = (0..8)
            .map(|seed| {
                let fs = fs.clone();
                thread::spawn(move || {
                    let mut rng = 0x9E37_79B9_7F4A_7C15u64 ^ (seed as u64 + 1);
                    for _ in 0..125 {
                        let from = xorshift(&mut rng) as usize % DIRS;
                        let to = xorshift(&mut rng) as usize % DIRS;
                        let file = xorshift(&mut rng) as usize % FILES;
                        // Most moves race and fail with NotFound; that is the
                        // point of the exercise.
                        let _ = fs.rename(
                            format!("/d{from}/f{file}"),
                            format!("/d{to}/f{file}"),
                            CopyOptions::REPLACE_EXISTING,
                        );
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().expect("mover thread panicked");
        }

        // Every file still exists exactly once, with its payload intact.
        for file in 0..FILES {
            let homes: Vec<usize> = (0..DIRS)
                .filter(|dir| fs.exists(format!("/d{dir}/f{file}")))
                .collect();
            assert_eq!(homes.len(), 1, "file f{file} found in {homes:?}");
            let data = read_file(&fs, &format!("/d{}/f{file}", homes[0]));
            assert_eq!(data, format!("payload {file}").as_bytes());
        }
    }

    #[test]
    fn concurrent_moves_and_deletes_do_not_deadlock() {
        let fs = new_fs();
        fs.create_directory("/a").expect("Failed to create");
        fs.create_directory("/b").expect("Failed to create");
        for index in 0..32 {
            write_file(&fs, &format!("/a/f{index}"), b"x");
        }
        let mover = {
            let fs = fs.clone();
            thread::spawn(move || {
                for index in 0..32 {
                    let _ = fs.rename(
                        format!("/a/f{index}"),
                        format!("/b/f{index}"),
                        CopyOptions::empty(),
                    );
                }
            })
        };
        let deleter = {
            let fs = fs.clone();
            thread::spawn(move || {
                for index in 0..32 {
                    let _ = fs.delete(format!("/a/f{index}"));
                    let _ = fs.delete(format!("/b/f{index}"));
                }
            })
        };
        mover.join().expect("mover panicked");
        deleter.join().expect("deleter panicked");

        // Whatever survived must be intact and reachable.
        for name in list_names(&fs, "/a") {
            assert!(fs.exists(format!("/a/{name}")));
        }
        for name in list_names(&fs, "/b") {
            assert!(fs.exists(format!("/b/{name}")));
        }
    }

    #[test]
    fn append_channels_serialize_their_writes() {
        let fs = new_fs();
        fs.create_file("/log").expect("Failed to create");
        let threads: Vec<_> = (0..2)
            .map(|_| {
                let fs = fs.clone();
                thread::spawn(move || {
                    let mut channel = fs
                        .new_byte_channel("/log", OpenOptions::APPEND)
                        .expect("Failed to open for append");
                    for _ in 0..100 {
                        channel.write(b"abc").expect("Failed to append");
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().expect("appender panicked");
        }
        assert_eq!(read_file(&fs, "/log").len(), 2 * 100 * 3);
    }

    #[test]
    fn readers_on_disjoint_subtrees_run_against_writers() {
        let fs = new_fs();
        fs.create_directory("/left").expect("Failed to create");
        fs.create_directory("/right").expect("Failed to create");
        write_file(&fs, "/left/data", b"constant");

        let reader = {
            let fs = fs.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(read_file(&fs, "/left/data"), b"constant");
                }
            })
        };
        let writer = {
            let fs = fs.clone();
            thread::spawn(move || {
                for index in 0..200 {
                    write_file(&fs, &format!("/right/f{index}"), b"x");
                }
            })
        };
        reader.join().expect("reader panicked");
        writer.join().expect("writer panicked");
        assert_eq!(list_names(&fs, "/right").len(), 200);
    }
}
