/// Row visibility derived from the caller's token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantFilter {
    /// Admins: every tenant, including global rows.
    Any,
    /// A single tenant; `None` selects global rows.
    Only(Option<String>),
}

/// Narrows a boxed diesel query to the rows a [`TenantFilter`] allows.
///
/// ```ignore
/// let query = scope_to_tenant!(builders::table.into_boxed(), builders::tenant_id, user.tenant_filter());
/// ```
#[macro_export]
macro_rules! scope_to_tenant {
    ($query:expr, $column:expr, $filter:expr) => {
        match $filter {
            $crate::tenancy::TenantFilter::Any => $query,
            $crate::tenancy::TenantFilter::Only(Some(tenant)) => $query.filter($column.eq(tenant)),
            $crate::tenancy::TenantFilter::Only(None) => $query.filter($column.is_null()),
        }
    };
}
