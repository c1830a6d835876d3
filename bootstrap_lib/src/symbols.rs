/// One function's code range inside a specific address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSymbol {
    pub name: String,
    pub entry: u64,
    pub end: u64,
}

impl FunctionSymbol {
    pub fn new(name: impl Into<String>, entry: u64, end: u64) -> Self {
        Self {
            name: name.into(),
            entry,
            end: end.max(entry),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.entry
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.entry
    }

    pub(crate) fn rebased(self, bias: u64) -> Self {
        Self {
            name: self.name,
            entry: self.entry.wrapping_add(bias),
            end: self.end.wrapping_add(bias),
        }
    }
}

/// Functions of one binary image in the order its metadata lists them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    functions: Vec<FunctionSymbol>,
}

impl SymbolTable {
    pub fn new(functions: Vec<FunctionSymbol>) -> Self {
        Self { functions }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionSymbol> {
        self.functions.iter()
    }

    /// All functions whose name contains `needle`, in table order.
    pub fn matching<'a, 'b>(
        &'a self,
        needle: &'b str,
    ) -> impl Iterator<Item = &'a FunctionSymbol> + 'b
    where
        'a: 'b,
    {
        self.functions.iter().filter(move |f| f.name.contains(needle))
    }

    /// The first function whose name contains `needle`.
    ///
    /// Substring matching survives the package prefixes and suffixes
    /// compilers add to names; ties go to the earliest entry.
    pub fn find(&self, needle: &str) -> crate::Result<&FunctionSymbol> {
        self.matching(needle)
            .next()
            .ok_or_else(|| crate::Error::SymbolNotFound(needle.into()))
    }
}
