use crate::calc::CalcError;
use serde_json::json;

/// Who is making a request. Parsed once from the `actor` param and matched
/// exhaustively afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Student { student_id: String },
    Teacher { teacher_id: String },
    Principal { staff_id: String },
    Secretary { staff_id: String },
    Bursar { staff_id: String },
}

impl Role {
    pub fn from_json(raw: Option<&serde_json::Value>) -> Result<Role, CalcError> {
        let Some(obj) = raw.and_then(|v| v.as_object()) else {
            return Err(CalcError::new(
                "bad_params",
                "missing actor (expected { role, id })",
            ));
        };
        let role = obj
            .get("role")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if id.is_empty() {
            return Err(CalcError::new("bad_params", "actor.id is required"));
        }

        match role.as_str() {
            "student" => Ok(Role::Student { student_id: id }),
            "teacher" => Ok(Role::Teacher { teacher_id: id }),
            "principal" => Ok(Role::Principal { staff_id: id }),
            "secretary" => Ok(Role::Secretary { staff_id: id }),
            "bursar" => Ok(Role::Bursar { staff_id: id }),
            _ => Err(CalcError::new(
                "bad_params",
                "actor.role must be one of: student, teacher, principal, secretary, bursar",
            )
            .with_details(json!({ "role": role }))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student { .. } => "student",
            Role::Teacher { .. } => "teacher",
            Role::Principal { .. } => "principal",
            Role::Secretary { .. } => "secretary",
            Role::Bursar { .. } => "bursar",
        }
    }

    pub fn actor_id(&self) -> &str {
        match self {
            Role::Student { student_id } => student_id,
            Role::Teacher { teacher_id } => teacher_id,
            Role::Principal { staff_id }
            | Role::Secretary { staff_id }
            | Role::Bursar { staff_id } => staff_id,
        }
    }

    /// Roster and teaching-assignment maintenance.
    pub fn can_manage_roster(&self) -> bool {
        matches!(self, Role::Principal { .. } | Role::Secretary { .. })
    }

    pub fn can_view_roster(&self) -> bool {
        !matches!(self, Role::Student { .. })
    }

    pub fn can_approve_marks(&self) -> bool {
        matches!(self, Role::Principal { .. })
    }

    /// Class-wide marks, rankings and report cards.
    pub fn can_view_class_results(&self) -> bool {
        match self {
            Role::Teacher { .. } | Role::Principal { .. } | Role::Secretary { .. } => true,
            Role::Student { .. } | Role::Bursar { .. } => false,
        }
    }

    /// Staff who may see any class results may see any student's; a student
    /// only sees their own.
    pub fn can_view_student_results(&self, student_id: &str) -> bool {
        match self {
            Role::Student { student_id: own } => own == student_id,
            _ => self.can_view_class_results(),
        }
    }

    pub fn forbidden(&self, action: &str) -> CalcError {
        CalcError::new(
            "forbidden",
            format!("{} may not {}", self.as_str(), action),
        )
        .with_details(json!({ "role": self.as_str(), "actorId": self.actor_id() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles_case_insensitively() {
        let r = Role::from_json(Some(&json!({ "role": "Teacher", "id": "T1" }))).expect("role");
        assert_eq!(
            r,
            Role::Teacher {
                teacher_id: "T1".to_string()
            }
        );
        assert_eq!(r.as_str(), "teacher");
        assert_eq!(r.actor_id(), "T1");
    }

    #[test]
    fn rejects_missing_or_unknown_actor() {
        assert_eq!(Role::from_json(None).unwrap_err().code, "bad_params");
        assert!(Role::from_json(Some(&json!({ "role": "teacher" }))).is_err());
        let e = Role::from_json(Some(&json!({ "role": "janitor", "id": "J1" }))).unwrap_err();
        assert_eq!(e.code, "bad_params");
    }

    #[test]
    fn permissions_by_role() {
        let student = Role::Student {
            student_id: "S1".to_string(),
        };
        let bursar = Role::Bursar {
            staff_id: "B1".to_string(),
        };
        let principal = Role::Principal {
            staff_id: "P1".to_string(),
        };
        assert!(student.can_view_student_results("S1"));
        assert!(!student.can_view_student_results("S2"));
        assert!(!student.can_view_class_results());
        assert!(!bursar.can_view_class_results());
        assert!(bursar.can_view_roster());
        assert!(principal.can_approve_marks());
        assert!(principal.can_view_student_results("S2"));
        assert_eq!(bursar.forbidden("approve marks").code, "forbidden");
    }
}
