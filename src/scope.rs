use crate::value::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeRef(pub(crate) u32);

/// One link of the scope chain. The variables live in `object`, an
/// interpreted object: a null-proto object for function/catch scopes, the
/// global object for the root scope, and an arbitrary object for `with`.
#[derive(Debug)]
pub(crate) struct ScopeData {
    pub(crate) parent: Option<ScopeRef>,
    pub(crate) strict: bool,
    pub(crate) object: ObjectRef,
    pub(crate) with_scope: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ScopeArena {
    scopes: Vec<ScopeData>,
}

impl ScopeArena {
    pub(crate) fn alloc(&mut self, scope: ScopeData) -> ScopeRef {
        let index = self.scopes.len();
        self.scopes.push(scope);
        ScopeRef(index as u32)
    }

    pub(crate) fn get(&self, scope: ScopeRef) -> &ScopeData {
        &self.scopes[scope.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, scope: ScopeRef) -> &mut ScopeData {
        &mut self.scopes[scope.0 as usize]
    }
}
