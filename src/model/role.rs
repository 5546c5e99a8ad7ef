use serde::Serialize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Supervisor = 3,
    Viewer = 4,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Supervisor),
            4 => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn can_write(self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_and_hr_write() {
        assert!(Role::from_id(1).unwrap().can_write());
        assert!(Role::from_id(2).unwrap().can_write());
        assert!(!Role::from_id(3).unwrap().can_write());
        assert!(!Role::from_id(4).unwrap().can_write());
        assert_eq!(Role::from_id(5), None);
    }
}
