//! Well-known relative paths and SQL-LIKE globs for common iOS-backed files.
//!
//! Purely inert data: these make `Session::lookup`/`lookup_like` call sites
//! self-documenting and save callers from retyping paths they'd otherwise have
//! to look up by opening the decrypted index themselves.

/// Exact `relativePath` values for commonly accessed files.
pub struct RelativePath;

impl RelativePath {
    pub const ADDRESS_BOOK: &'static str = "Library/AddressBook/AddressBook.sqlitedb";
    pub const TEXT_MESSAGES: &'static str = "Library/SMS/sms.db";
    pub const CALL_HISTORY: &'static str = "Library/CallHistoryDB/CallHistory.storedata";
    pub const NOTES: &'static str = "Library/Notes/notes.sqlite";
    pub const NOTES_V7: &'static str = "Library/Notes/NotesV7.storedata";
    pub const CALENDARS: &'static str = "Library/Calendar/Calendar.sqlitedb";
    pub const HEALTH: &'static str = "Health/healthdb.sqlite";
    pub const HEALTH_SECURE: &'static str = "Health/healthdb_secure.sqlite";
    pub const SAFARI_HISTORY: &'static str = "Library/Safari/History.db";
    pub const SAFARI_BOOKMARKS: &'static str = "Library/Safari/Bookmarks.db";

    pub const WHATSAPP_MESSAGES: &'static str = "ChatStorage.sqlite";
    pub const WHATSAPP_CONTACTS: &'static str = "ContactsV2.sqlite";
}

/// SQL-LIKE wildcards for commonly accessed groups of files, for use with
/// [`crate::Session::lookup_like`].
pub struct RelativePathsLike;

impl RelativePathsLike {
    pub const CAMERA_ROLL: &'static str = "Media/DCIM/%APPLE/IMG%.%";
    pub const SMS_ATTACHMENTS: &'static str = "Library/SMS/Attachments/%.%";
    pub const FACEBOOK_MESSENGER: &'static str = "Library/MessengerMedia/%.%";
    pub const PHOTO_STREAM: &'static str = "Media/PhotoStreamsData/%.%";

    pub const WHATSAPP_ATTACHED_IMAGES: &'static str = "Message/Media/%.jpg";
    pub const WHATSAPP_ATTACHED_VIDEOS: &'static str = "Message/Media/%.mp4";
    pub const WHATSAPP_ATTACHMENTS: &'static str = "Message/Media/%.%";
}
