//! Which parts of the front-end a session may reach. Data only; rendering
//! lives elsewhere.

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Home,
    Login,
    Register,
    Categories,
    Posts,
    Chat,
    CreateCategory,
}

const LOGGED_OUT: &[Section] = &[Section::Home, Section::Login, Section::Register];

const LOGGED_IN: &[Section] = &[
    Section::Home,
    Section::Categories,
    Section::Posts,
    Section::Chat,
    Section::CreateCategory,
];

pub fn visible_sections(session: Option<&Session>) -> &'static [Section] {
    match session {
        Some(_) => LOGGED_IN,
        None => LOGGED_OUT,
    }
}

pub fn is_visible(section: Section, session: Option<&Session>) -> bool {
    visible_sections(session).contains(&section)
}

/// Delete buttons on categories, posts and comments are admin-only.
pub fn can_delete(session: Option<&Session>) -> bool {
    session.is_some_and(Session::is_admin)
}
