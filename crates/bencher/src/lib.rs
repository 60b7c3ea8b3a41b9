#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    table: RouteTable,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, table: RouteTable) -> Self {
        Self { name, group, table }
    }

    pub fn small(name: &'static str, table: RouteTable) -> Self {
        Self::new(name, TestGroup::Small, table)
    }

    pub fn normal(name: &'static str, table: RouteTable) -> Self {
        Self::new(name, TestGroup::Normal, table)
    }

    pub fn large(name: &'static str, table: RouteTable) -> Self {
        Self::new(name, TestGroup::Large, table)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn file_name(&self) -> &'static str {
        self.table().file_name
    }
}

/// A route table read from a resource file, one `METHOD pattern` pair per line.
#[derive(Debug, Copy, Clone)]
pub struct RouteTable {
    file_name: &'static str,
    content: &'static str,
}

impl RouteTable {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// The `(method, pattern)` pairs of the table; blank lines are skipped.
    pub fn routes(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        self.content.lines().filter_map(|line| line.trim().split_once(' '))
    }

    /// One concrete request per route: `(method, path)`.
    pub fn requests(&self) -> Vec<(&'static str, String)> {
        self.routes().map(|(method, pattern)| (method, sample_path(pattern))).collect()
    }
}

/// Fills the parameters of `pattern` with sample values.
pub fn sample_path(pattern: &str) -> String {
    let segments = pattern
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.as_bytes().first() {
            Some(b':') => "value",
            Some(b'*') => "nested/file.txt",
            _ => segment,
        })
        .collect::<Vec<_>>();
    format!("/{}", segments.join("/"))
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

impl TestGroup {
    /// Criterion samples per benchmark; large tables take fewer.
    pub fn sample_size(self) -> usize {
        match self {
            TestGroup::Small | TestGroup::Normal => 100,
            TestGroup::Large => 30,
        }
    }
}
