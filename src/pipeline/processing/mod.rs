// Pipeline processing: role resolution, aggregation, phone normalization,
// identity resolution, and curation

pub mod aggregate;
pub mod curate;
pub mod identity;
pub mod phone;
pub mod roles;

pub use aggregate::{list_farmers, sales_records, top_items, PurchaseAggregator};
pub use curate::{outreach_list, CurationOptions, ResultCurator};
pub use identity::{IdentityResolver, JoinReport, MemberDirectory};
pub use phone::{normalize_phone, PhoneNormalizer};
pub use roles::{required_roles, ColumnRoleResolver, MatchMode, RoleRule, ROLE_RULES};
