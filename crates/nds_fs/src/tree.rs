//! Hierarchical path index over the flat slot ID space.
//!
//! Files inside a game image live in one ordered sequence of byte slots; the
//! folder tree only assigns names and nesting on top of that sequence. Every
//! folder records the lowest slot ID owned by its subtree (`first_id`), and a
//! file's ID is `folder.first_id + position` within the folder's file list.
//! Inserting or removing a slot therefore shifts the bookkeeping of every
//! folder behind it; those cascades are applied incrementally, never
//! recomputed from scratch.

/// One node of the folder tree.
///
/// Child files and folders both keep their insertion order; order is
/// significant because it decides slot IDs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Folder {
    first_id: u32,
    files: Vec<String>,
    folders: Vec<(String, Folder)>,
}

/// Split a path on `/`, dropping empty segments from leading, trailing or
/// doubled separators.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl Folder {
    /// Create an empty folder whose slots would start at `first_id`.
    pub fn new(first_id: u32) -> Folder {
        Folder {
            first_id,
            ..Default::default()
        }
    }

    /// The lowest slot ID owned by this subtree.
    pub fn first_id(&self) -> u32 {
        self.first_id
    }

    /// Names of the files directly inside this folder, in slot order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// The named subfolders of this folder, in insertion order.
    pub fn folders(&self) -> &[(String, Folder)] {
        &self.folders
    }

    /// Resolve a folder path relative to this node. The empty path resolves
    /// to this node itself.
    pub fn folder(&self, path: &str) -> Option<&Folder> {
        let mut node = self;
        for part in split_path(path) {
            node = node
                .folders
                .iter()
                .find(|(name, _)| name == part)
                .map(|(_, folder)| folder)?;
        }
        Some(node)
    }

    pub(crate) fn folder_mut(&mut self, path: &str) -> Option<&mut Folder> {
        let mut node = self;
        for part in split_path(path) {
            node = node
                .folders
                .iter_mut()
                .find(|(name, _)| name == part)
                .map(|(_, folder)| folder)?;
        }
        Some(node)
    }

    /// Resolve a file path to its slot ID.
    pub fn id_of(&self, path: &str) -> Option<u32> {
        let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
        let folder = self.folder(dir)?;
        let index = folder.files.iter().position(|f| f == name)?;
        Some(folder.first_id + index as u32)
    }

    /// Resolve a slot ID back to its full path.
    pub fn path_of(&self, id: u32) -> Option<String> {
        let span = self.files.len() as u32;
        if id >= self.first_id && id < self.first_id + span {
            return Some(self.files[(id - self.first_id) as usize].clone());
        }

        for (name, folder) in &self.folders {
            if let Some(rest) = folder.path_of(id) {
                return Some(format!("{name}/{rest}"));
            }
        }
        None
    }

    /// Depth-first list of every `(path, id)` pair under this node.
    pub fn walk(&self) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        self.walk_into("", &mut out);
        out
    }

    fn walk_into(&self, prefix: &str, out: &mut Vec<(String, u32)>) {
        for (index, name) in self.files.iter().enumerate() {
            out.push((format!("{prefix}{name}"), self.first_id + index as u32));
        }
        for (name, folder) in &self.folders {
            folder.walk_into(&format!("{prefix}{name}/"), out);
        }
    }

    /// Append a file name to this folder, claiming the next slot behind its
    /// current file list. Returns the new slot ID.
    pub fn push_file(&mut self, name: &str) -> u32 {
        let id = self.first_id + self.files.len() as u32;
        self.files.push(name.to_owned());
        id
    }

    pub(crate) fn remove_file_name(&mut self, name: &str) -> bool {
        match self.files.iter().position(|f| f == name) {
            Some(index) => {
                self.files.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn rename_file_name(&mut self, name: &str, new_name: &str) -> bool {
        match self.files.iter().position(|f| f == name) {
            Some(index) => {
                self.files[index] = new_name.to_owned();
                true
            }
            None => false,
        }
    }

    /// Attach `folder` as a subfolder named `name`.
    pub fn push_folder(&mut self, name: &str, folder: Folder) {
        self.folders.push((name.to_owned(), folder));
    }

    pub(crate) fn take_folder(&mut self, name: &str) -> Option<Folder> {
        let index = self.folders.iter().position(|(n, _)| n == name)?;
        Some(self.folders.remove(index).1)
    }

    pub(crate) fn replace_folder_name(&mut self, name: &str, new_name: &str) -> bool {
        match self.folders.iter().position(|(n, _)| n == name) {
            Some(index) => {
                self.folders[index].0 = new_name.to_owned();
                true
            }
            None => false,
        }
    }

    /// Propagate a slot insertion at `new_id` through the tree: every folder
    /// except the one that received the file (identified by `skip`, its path
    /// segments) moves up when its `first_id` is at or behind the insertion
    /// point.
    pub(crate) fn cascade_insert(&mut self, new_id: u32, skip: &[&str]) {
        fn walk(folder: &mut Folder, new_id: u32, skip: Option<&[&str]>) {
            let is_target = matches!(skip, Some([]));
            if !is_target && folder.first_id >= new_id {
                folder.first_id += 1;
            }
            for (name, child) in &mut folder.folders {
                let child_skip = match skip {
                    Some([head, rest @ ..]) if head == name => Some(rest),
                    _ => None,
                };
                walk(child, new_id, child_skip);
            }
        }
        walk(self, new_id, Some(skip));
    }

    /// Propagate a slot removal at `removed_id`: every folder behind the
    /// removal point moves down.
    pub(crate) fn cascade_remove(&mut self, removed_id: u32) {
        if self.first_id > removed_id {
            self.first_id -= 1;
        }
        for (_, child) in &mut self.folders {
            child.cascade_remove(removed_id);
        }
    }

    /// The minimum slot ID reachable in this subtree, walking every node.
    ///
    /// `first_id` must always equal this; the full walk exists so tests can
    /// check the invariant, the hot path never calls it.
    pub fn min_reachable_id(&self) -> Option<u32> {
        let own = (!self.files.is_empty()).then_some(self.first_id);
        self.folders
            .iter()
            .filter_map(|(_, f)| f.min_reachable_id())
            .chain(own)
            .min()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Folder;

    fn sample_tree() -> Folder {
        // Slot layout: 0 = boot.bin, 1 = data/a.bin, 2 = data/b.bin,
        // 3 = data/sub/c.bin, 4 = sound/s.sad
        let mut root = Folder::new(0);
        root.push_file("boot.bin");

        let mut data = Folder::new(1);
        data.push_file("a.bin");
        data.push_file("b.bin");

        let mut sub = Folder::new(3);
        sub.push_file("c.bin");
        data.push_folder("sub", sub);

        let mut sound = Folder::new(4);
        sound.push_file("s.sad");

        root.push_folder("data", data);
        root.push_folder("sound", sound);
        root
    }

    #[test]
    fn resolves_paths_to_ids() {
        let root = sample_tree();

        assert_eq!(root.id_of("boot.bin"), Some(0));
        assert_eq!(root.id_of("data/a.bin"), Some(1));
        assert_eq!(root.id_of("data/sub/c.bin"), Some(3));
        assert_eq!(root.id_of("/data/b.bin"), Some(2));
        assert_eq!(root.id_of("data/missing.bin"), None);
        assert_eq!(root.id_of("nope/a.bin"), None);
    }

    #[test]
    fn resolves_ids_to_paths() {
        let root = sample_tree();

        assert_eq!(root.path_of(0).as_deref(), Some("boot.bin"));
        assert_eq!(root.path_of(3).as_deref(), Some("data/sub/c.bin"));
        assert_eq!(root.path_of(4).as_deref(), Some("sound/s.sad"));
        assert_eq!(root.path_of(5), None);
    }

    #[test]
    fn walk_lists_depth_first() {
        let root = sample_tree();

        assert_eq!(
            root.walk(),
            vec![
                ("boot.bin".to_owned(), 0),
                ("data/a.bin".to_owned(), 1),
                ("data/b.bin".to_owned(), 2),
                ("data/sub/c.bin".to_owned(), 3),
                ("sound/s.sad".to_owned(), 4),
            ]
        );
    }

    #[test]
    fn insert_cascade_shifts_following_folders() {
        let mut root = sample_tree();

        // Insert behind data/b.bin: new id 3 pushes sub and sound up.
        let new_id = root.folder_mut("data").unwrap().push_file("z.bin");
        assert_eq!(new_id, 3);
        root.cascade_insert(new_id, &["data"]);

        assert_eq!(root.folder("data").unwrap().first_id(), 1);
        assert_eq!(root.folder("data/sub").unwrap().first_id(), 4);
        assert_eq!(root.folder("sound").unwrap().first_id(), 5);
        assert_eq!(root.id_of("data/z.bin"), Some(3));
        assert_eq!(root.id_of("data/sub/c.bin"), Some(4));
    }

    #[test]
    fn insert_cascade_skips_empty_target_folder() {
        let mut root = sample_tree();
        root.folder_mut("data")
            .unwrap()
            .push_folder("fresh", Folder::new(3));

        // The empty folder has first_id == new_id and would be bumped if it
        // were not the target.
        let new_id = root.folder_mut("data/fresh").unwrap().push_file("n.bin");
        assert_eq!(new_id, 3);
        root.cascade_insert(new_id, &["data", "fresh"]);

        assert_eq!(root.folder("data/fresh").unwrap().first_id(), 3);
        assert_eq!(root.folder("data/sub").unwrap().first_id(), 4);
        assert_eq!(root.folder("sound").unwrap().first_id(), 5);
    }

    #[test]
    fn remove_cascade_shifts_back() {
        let mut root = sample_tree();

        assert!(root.folder_mut("data").unwrap().remove_file_name("a.bin"));
        root.cascade_remove(1);

        assert_eq!(root.id_of("data/b.bin"), Some(1));
        assert_eq!(root.folder("data/sub").unwrap().first_id(), 2);
        assert_eq!(root.folder("sound").unwrap().first_id(), 3);
    }

    #[test]
    fn first_id_matches_min_reachable() {
        let mut root = sample_tree();

        let new_id = root.folder_mut("data").unwrap().push_file("z.bin");
        root.cascade_insert(new_id, &["data"]);
        assert!(root.folder_mut("data").unwrap().remove_file_name("a.bin"));
        root.cascade_remove(1);

        fn check(folder: &Folder) {
            if let Some(min) = folder.min_reachable_id() {
                assert_eq!(folder.first_id(), min);
            }
            for (_, child) in folder.folders() {
                check(child);
            }
        }
        check(&root);
    }
}
