/// Keyword taxonomy for sales exports and member directories.
/// Labels are matched after spaces are stripped and the text is lowercased,
/// so multi-word English terms are written without spaces.

// Producer / farmer
pub const FARMER_KEYWORDS: &[&str] = &["농가", "생산자", "공급자", "producer", "supplier", "farm"];
pub const FARMER_EXCLUDES: &[&str] = &["코드", "번호", "code", "id"];

// Buyer / member identifier
pub const BUYER_ID_KEYWORDS: &[&str] = &[
    "회원번호",
    "회원코드",
    "고객번호",
    "고객코드",
    "회원id",
    "memberid",
    "buyerid",
    "customerid",
    "memberno",
    "customerno",
];

// Buyer / member display name
pub const BUYER_NAME_KEYWORDS: &[&str] = &[
    "회원명",
    "구매자",
    "성명",
    "고객명",
    "이름",
    "회원",
    "membername",
    "buyername",
    "customername",
    "member",
    "buyer",
    "customer",
    "name",
];
pub const BUYER_NAME_EXCLUDES: &[&str] = &[
    "번호", "코드", "id", "memberno", "customerno", "number", "전화", "핸드폰", "휴대폰", "연락처",
    "phone", "mobile", "contact", "농가", "생산자", "공급자", "producer", "supplier", "farm", "상품",
    "품목", "품명", "item", "product",
];

// Item / product
pub const ITEM_KEYWORDS: &[&str] = &["상품", "품목", "품명", "item", "product", "goods"];
pub const ITEM_EXCLUDES: &[&str] = &["코드", "code"];

// Phone / contact
pub const PHONE_KEYWORDS: &[&str] = &[
    "전화", "핸드폰", "휴대폰", "연락처", "phone", "mobile", "contact", "tel",
];

/// Rendered value of the "no verified contact" sentinel.
pub const SENTINEL_PHONE: &str = "-";

/// Rows scanned while hunting for the header when no config is given.
pub const DEFAULT_SCAN_ROWS: usize = 30;

/// Default number of contacts in a copy-paste outreach list.
pub const DEFAULT_TOP_N: usize = 20;

/// Default number of best-selling items reported per producer.
pub const DEFAULT_TOP_ITEMS: usize = 5;
